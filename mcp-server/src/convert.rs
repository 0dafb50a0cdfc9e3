//! LaTeX conversion and Typst compilation through the sandbox session.
//!
//! Every request gets its own directory inside the session scratch directory;
//! it is removed when the request finishes, whatever the outcome.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use typst_mcp_sandbox::ExecOutput;
use typst_mcp_sandbox::SandboxSession;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::error::ServerError;

pub const MAX_LATEX_BYTES: usize = 50_000;
pub const MAX_TYPST_BYTES: usize = 100_000;

pub const VALID: &str = "VALID";
const INVALID_PREFIX: &str = "INVALID! Error message: ";

const RENDER_PPI: &str = "500";
const PAGE_PATTERN: &str = "page{0p}.png";

#[derive(Debug, Clone, Copy)]
pub struct ToolTimeouts {
    pub pandoc: Duration,
    pub compile: Duration,
    pub syntax_check: Duration,
    pub image_render: Duration,
}

impl From<&ServerConfig> for ToolTimeouts {
    fn from(config: &ServerConfig) -> Self {
        Self {
            pandoc: config.pandoc_timeout(),
            compile: config.typst_compile_timeout(),
            syntax_check: config.syntax_check_timeout(),
            image_render: config.image_render_timeout(),
        }
    }
}

/// A compiled PDF inside its request directory. The directory goes away
/// when this is dropped.
#[derive(Debug)]
pub struct CompiledPdf {
    _workdir: TempDir,
    pub path: PathBuf,
    pub size: u64,
}

impl CompiledPdf {
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

#[derive(Debug, Clone)]
pub struct Converter {
    session: Arc<SandboxSession>,
    scratch_dir: PathBuf,
    strict: bool,
    timeouts: ToolTimeouts,
}

fn check_size(what: &'static str, input: &str, max: usize) -> Result<()> {
    if input.len() > max {
        return Err(ServerError::InputTooLarge {
            what,
            len: input.len(),
            max,
        });
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Converter {
    pub fn new(
        session: Arc<SandboxSession>,
        scratch_dir: PathBuf,
        strict: bool,
        timeouts: ToolTimeouts,
    ) -> Self {
        Self {
            session,
            scratch_dir,
            strict,
            timeouts,
        }
    }

    fn workdir(&self) -> Result<TempDir> {
        Ok(tempfile::Builder::new()
            .prefix("req-")
            .tempdir_in(&self.scratch_dir)?)
    }

    fn pandoc_command(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "pandoc".to_string(),
            "--sandbox".to_string(),
            path_arg(input),
            "--from=latex".to_string(),
            "--to=typst".to_string(),
            "--output".to_string(),
            path_arg(output),
        ]
    }

    /// `typst compile [--root <scratch>] <input> [extra...] <output>`.
    fn typst_command(&self, input: &Path, extra: &[&str], output: &Path) -> Vec<String> {
        let mut argv = vec!["typst".to_string(), "compile".to_string()];
        if self.strict {
            argv.push("--root".to_string());
            argv.push(path_arg(&self.scratch_dir));
        }
        argv.push(path_arg(input));
        argv.extend(extra.iter().map(ToString::to_string));
        argv.push(path_arg(output));
        argv
    }

    async fn run(
        &self,
        what: &'static str,
        argv: Vec<String>,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        let output = self.session.run(argv, Some(cwd), timeout).await?;
        if output.timed_out {
            return Err(ServerError::Timeout {
                what,
                after: timeout,
            });
        }
        Ok(output)
    }

    async fn write_input(dir: &TempDir, name: &str, contents: &str) -> Result<PathBuf> {
        let path = dir.path().join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    pub async fn latex_to_typst(&self, latex: &str) -> Result<String> {
        check_size("LaTeX snippet", latex, MAX_LATEX_BYTES)?;
        let dir = self.workdir()?;
        let input = Self::write_input(&dir, "main.tex", latex).await?;
        let output_path = dir.path().join("main.typ");

        let output = self
            .run(
                "LaTeX conversion",
                Self::pandoc_command(&input, &output_path),
                dir.path(),
                self.timeouts.pandoc,
            )
            .await?;
        if !output.success() {
            return Err(ServerError::ConvertFailed {
                stderr: diagnostics(&output),
            });
        }
        let typst = tokio::fs::read_to_string(&output_path).await?;
        Ok(typst.trim().to_string())
    }

    /// `VALID`, or `INVALID! Error message: ...` with the compiler's
    /// diagnostics. Oversized input is reported the same way.
    pub async fn check_syntax(&self, snippet: &str) -> Result<String> {
        if snippet.len() > MAX_TYPST_BYTES {
            return Ok(format!(
                "{INVALID_PREFIX}Snippet too large ({} bytes, max {MAX_TYPST_BYTES} bytes)",
                snippet.len()
            ));
        }
        let dir = self.workdir()?;
        let input = Self::write_input(&dir, "main.typ", snippet).await?;
        let argv = self.typst_command(&input, &[], &dir.path().join("main.pdf"));

        let output = self
            .run("Syntax check", argv, dir.path(), self.timeouts.syntax_check)
            .await?;
        if output.success() {
            Ok(VALID.to_string())
        } else {
            Ok(format!("{INVALID_PREFIX}{}", diagnostics(&output)))
        }
    }

    /// Renders every page to PNG and returns the encoded pages in order.
    pub async fn render_pages(&self, snippet: &str) -> Result<Vec<Vec<u8>>> {
        check_size("Typst snippet", snippet, MAX_TYPST_BYTES)?;
        let dir = self.workdir()?;
        let input = Self::write_input(&dir, "main.typ", snippet).await?;
        let argv = self.typst_command(
            &input,
            &["--format", "png", "--ppi", RENDER_PPI],
            &dir.path().join(PAGE_PATTERN),
        );

        let output = self
            .run("Image rendering", argv, dir.path(), self.timeouts.image_render)
            .await?;
        if !output.success() {
            return Err(ServerError::CompileFailed {
                stderr: diagnostics(&output),
            });
        }

        let mut pages = page_files(dir.path()).await?;
        if pages.is_empty() {
            return Err(ServerError::NoPages);
        }
        pages.sort();
        let mut images = Vec::with_capacity(pages.len());
        for page in pages {
            images.push(tokio::fs::read(&page).await?);
        }
        tracing::debug!("rendered {} page(s)", images.len());
        Ok(images)
    }

    pub async fn compile_pdf(&self, snippet: &str) -> Result<CompiledPdf> {
        check_size("Typst snippet", snippet, MAX_TYPST_BYTES)?;
        let dir = self.workdir()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let input = Self::write_input(&dir, &format!("main_{id}.typ"), snippet).await?;
        let pdf = dir.path().join(format!("output_{id}.pdf"));
        let argv = self.typst_command(&input, &[], &pdf);

        let output = self
            .run("PDF compilation", argv, dir.path(), self.timeouts.compile)
            .await?;
        if !output.success() {
            return Err(ServerError::CompileFailed {
                stderr: diagnostics(&output),
            });
        }
        let size = tokio::fs::metadata(&pdf).await?.len();
        Ok(CompiledPdf {
            _workdir: dir,
            path: pdf,
            size,
        })
    }
}

fn diagnostics(output: &ExecOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("Unknown error (exit code {})", output.exit_code)
    } else {
        stderr.to_string()
    }
}

/// `page*.png` files in `dir`. Zero-padded numbering makes name order page
/// order.
async fn page_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("page") && name.ends_with(".png") {
            pages.push(entry.path());
        }
    }
    Ok(pages)
}
