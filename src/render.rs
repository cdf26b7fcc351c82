//! Calendar renderer.
//!
//! Renders one calendar page as an image of an exact pixel size. The
//! production [`CommandRenderer`] runs an external vector-calendar program:
//!
//! ```text
//! <program> -s <style> --paper=-<W>:-<H> [MONTH YEAR] [args...] [--no-footer --border=0] <outfile>
//! ```
//!
//! Negative paper dimensions request pixels rather than millimetres. The
//! trailing defaults are skipped in vanilla mode.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to run calendar renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("calendar renderer '{program}' failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("calendar renderer produced no image at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// One calendar page to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub style: String,
    /// Target `(width, height)` in pixels.
    pub size: (u32, u32),
    pub args: Vec<String>,
    pub output: PathBuf,
}

/// Trait for calendar renderers.
pub trait CalendarRenderer: Sync {
    /// Write the calendar image to `request.output`.
    fn render(&self, request: &RenderRequest) -> Result<(), RenderError>;
}

/// Renderer arguments for one unit of work.
///
/// Month and year come first, then the user's extra arguments, then
/// `--no-footer --border=0` unless `vanilla`.
pub fn renderer_args(month: Option<(u32, i32)>, extra: &[String], vanilla: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(extra.len() + 4);
    if let Some((m, y)) = month {
        args.push(m.to_string());
        args.push(y.to_string());
    }
    args.extend(extra.iter().cloned());
    if !vanilla {
        args.push("--no-footer".to_string());
        args.push("--border=0".to_string());
    }
    args
}

/// Runs an external calendar program.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for `request`, excluding the program name.
    pub fn command_args(request: &RenderRequest) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            request.style.clone(),
            format!("--paper=-{}:-{}", request.size.0, request.size.1),
        ];
        args.extend(request.args.iter().cloned());
        args.push(request.output.to_string_lossy().to_string());
        args
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.len() > 0)
}

impl CalendarRenderer for CommandRenderer {
    fn render(&self, request: &RenderRequest) -> Result<(), RenderError> {
        let args = Self::command_args(request);
        log::debug!("{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !has_content(&request.output) {
            return Err(RenderError::MissingOutput(request.output.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock renderer that records requests and writes a small transparent PNG.
    #[derive(Default)]
    pub struct MockRenderer {
        pub requests: Mutex<Vec<RenderRequest>>,
        /// Fail every render.
        pub fail: bool,
        /// Leave the output file unwritten.
        pub skip_output: bool,
    }

    impl MockRenderer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn get_requests(&self) -> Vec<RenderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CalendarRenderer for MockRenderer {
        fn render(&self, request: &RenderRequest) -> Result<(), RenderError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(RenderError::Failed {
                    program: "mock".into(),
                    status: "exit status: 1".into(),
                    stderr: "mock failure".into(),
                });
            }
            if !self.skip_output {
                let (w, h) = (request.size.0.clamp(1, 64), request.size.1.clamp(1, 64));
                image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]))
                    .save_with_format(&request.output, image::ImageFormat::Png)
                    .unwrap();
            }
            Ok(())
        }
    }

    fn request(output: PathBuf) -> RenderRequest {
        RenderRequest {
            style: "transparent".into(),
            size: (640, 480),
            args: vec!["1".into(), "2025".into()],
            output,
        }
    }

    // =========================================================================
    // argument construction
    // =========================================================================

    #[test]
    fn renderer_args_default_order() {
        let args = renderer_args(Some((3, 2025)), &["--lang=fr".to_string()], false);
        assert_eq!(args, vec!["3", "2025", "--lang=fr", "--no-footer", "--border=0"]);
    }

    #[test]
    fn renderer_args_vanilla_without_month() {
        let args = renderer_args(None, &["-l".to_string(), "el".to_string()], true);
        assert_eq!(args, vec!["-l", "el"]);
    }

    #[test]
    fn command_args_include_paper_in_pixels() {
        let args = CommandRenderer::command_args(&request("/tmp/cal.png".into()));
        assert_eq!(
            args,
            vec!["-s", "transparent", "--paper=-640:-480", "1", "2025", "/tmp/cal.png"]
        );
    }

    // =========================================================================
    // CommandRenderer
    // =========================================================================

    #[test]
    fn missing_program_is_spawn_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let renderer = CommandRenderer::new("/nonexistent/calendar-renderer");
        let err = renderer.render(&request(tmp.path().join("c.png"))).unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let renderer = CommandRenderer::new("false");
        let err = renderer.render(&request(tmp.path().join("c.png"))).unwrap_err();
        assert!(matches!(err, RenderError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn success_without_output_is_missing_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let renderer = CommandRenderer::new("true");
        let out = tmp.path().join("c.png");
        let err = renderer.render(&request(out.clone())).unwrap_err();
        assert!(matches!(err, RenderError::MissingOutput(p) if p == out));
    }

    #[test]
    fn mock_writes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("c.png");
        let renderer = MockRenderer::new();
        renderer.render(&request(out.clone())).unwrap();
        assert!(has_content(&out));
        assert_eq!(renderer.get_requests().len(), 1);
    }
}
