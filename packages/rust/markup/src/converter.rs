//! HTML-to-markup converters.
//!
//! [`PandocConverter`] drives an external pandoc process through two scratch
//! files, with a hard time budget per call. [`BuiltinMarkdownConverter`]
//! converts in-process with `htmd` and only produces Markdown.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use nsxconv_shared::{ConvertError, ConverterConfig, ConverterEngine, MarkupFormat, Result};

/// Budget for the `-v` version probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Converts one HTML fragment into the target markup.
#[async_trait]
pub trait MarkupConverter: Send + Sync {
    async fn convert(&self, html: &str) -> Result<String>;

    /// Markup this converter produces.
    fn format(&self) -> MarkupFormat;
}

/// Build the converter selected by the config.
///
/// Fails with [`ConvertError::ConverterMissing`] when pandoc is selected but
/// cannot be run, and with a config error when the builtin engine is asked
/// for anything but Markdown.
pub async fn converter_for(
    config: &ConverterConfig,
    format: MarkupFormat,
) -> Result<Box<dyn MarkupConverter>> {
    match config.engine {
        ConverterEngine::Pandoc => Ok(Box::new(PandocConverter::locate(config, format).await?)),
        ConverterEngine::Builtin if format == MarkupFormat::Markdown => {
            Ok(Box::new(BuiltinMarkdownConverter))
        }
        ConverterEngine::Builtin => Err(ConvertError::config(format!(
            "the builtin converter cannot produce {format}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Pandoc version
// ---------------------------------------------------------------------------

/// `major.minor` of the located pandoc binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PandocVersion {
    pub major: u32,
    pub minor: u32,
}

impl PandocVersion {
    /// First release that replaced `--no-wrap` with `--wrap=none`.
    const WRAP_OPTION: Self = Self { major: 1, minor: 16 };
    /// First release with Lua filter support.
    const LUA_FILTERS: Self = Self { major: 2, minor: 0 };

    /// Parse the first line of `pandoc -v` output (`pandoc 3.1.9`).
    pub fn parse(output: &str) -> Option<Self> {
        static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^\S*pandoc\S*\s+v?(\d+)\.(\d+)").expect("valid regex")
        });

        let first = output.lines().next()?.trim();
        let caps = VERSION_RE.captures(first)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
        })
    }
}

impl std::fmt::Display for PandocVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ---------------------------------------------------------------------------
// PandocConverter
// ---------------------------------------------------------------------------

/// External pandoc process, one invocation per note.
///
/// The scratch input and output files live as long as the converter and are
/// removed when it is dropped.
#[derive(Debug)]
pub struct PandocConverter {
    program: String,
    version: Option<PandocVersion>,
    format: MarkupFormat,
    lua_filter: Option<PathBuf>,
    timeout: Duration,
    input: NamedTempFile,
    output: NamedTempFile,
}

impl PandocConverter {
    /// Probe the configured program and prepare scratch files.
    ///
    /// An unrecognised or unanswered version probe is not fatal; modern
    /// arguments are used.
    #[instrument(skip_all, fields(program = %config.program, %format))]
    pub async fn locate(config: &ConverterConfig, format: MarkupFormat) -> Result<Self> {
        let version = probe_version(&config.program, PROBE_TIMEOUT).await?;
        match version {
            Some(v) => info!(version = %v, "found pandoc"),
            None => warn!("could not determine pandoc version, assuming a recent release"),
        }

        let lua_filter = match (&config.lua_filter, version) {
            (Some(filter), Some(v)) if v >= PandocVersion::LUA_FILTERS => Some(PathBuf::from(filter)),
            (Some(filter), _) => {
                warn!(%filter, "lua filter ignored, it needs pandoc 2.0 or newer");
                None
            }
            (None, _) => None,
        };

        let input = scratch_file(".html")?;
        let output = scratch_file(output_suffix(format))?;

        Ok(Self {
            program: config.program.clone(),
            version,
            format,
            lua_filter,
            timeout: Duration::from_secs(config.timeout_secs),
            input,
            output,
        })
    }

    /// Full argument list for one conversion.
    pub fn args(&self) -> Vec<OsString> {
        build_args(
            self.version,
            self.format,
            self.lua_filter.as_deref(),
            self.input.path(),
            self.output.path(),
        )
    }
}

/// Run `<program> -v` and parse its version line.
///
/// Only a program that cannot be started is an error; a probe that hangs
/// past `budget` yields `None`.
async fn probe_version(program: &str, budget: Duration) -> Result<Option<PandocVersion>> {
    let mut probe = Command::new(program);
    probe.arg("-v").stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(budget, probe.output()).await {
        Ok(Ok(output)) => Ok(PandocVersion::parse(&String::from_utf8_lossy(&output.stdout))),
        Ok(Err(e)) => Err(ConvertError::ConverterMissing {
            program: program.to_string(),
            message: e.to_string(),
        }),
        Err(_) => {
            warn!(secs = budget.as_secs_f32(), "no answer to `-v`");
            Ok(None)
        }
    }
}

#[async_trait]
impl MarkupConverter for PandocConverter {
    async fn convert(&self, html: &str) -> Result<String> {
        let input = self.input.path();
        let output = self.output.path();

        tokio::fs::write(input, html)
            .await
            .map_err(|e| ConvertError::io(input, e))?;
        // a stale result from the previous note must never leak through
        tokio::fs::write(output, b"")
            .await
            .map_err(|e| ConvertError::io(output, e))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let result = run_with_timeout(cmd, self.timeout).await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConvertError::Conversion(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        let converted = tokio::fs::read_to_string(output)
            .await
            .map_err(|e| ConvertError::io(output, e))?;
        debug!(html_len = html.len(), out_len = converted.len(), "pandoc conversion complete");
        Ok(converted)
    }

    fn format(&self) -> MarkupFormat {
        self.format
    }
}

fn output_suffix(format: MarkupFormat) -> &'static str {
    match format {
        MarkupFormat::Org => ".org",
        MarkupFormat::Markdown => ".md",
    }
}

fn scratch_file(suffix: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("nsxconv-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| ConvertError::io(std::env::temp_dir(), e))
}

fn build_args(
    version: Option<PandocVersion>,
    format: MarkupFormat,
    lua_filter: Option<&Path>,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-f".into(),
        "html".into(),
        "-t".into(),
        format.pandoc_writer().into(),
    ];

    match version {
        Some(v) if v < PandocVersion::WRAP_OPTION => args.push("--no-wrap".into()),
        _ => args.push("--wrap=none".into()),
    }

    if let Some(filter) = lua_filter {
        let mut arg = OsString::from("--lua-filter=");
        arg.push(filter);
        args.push(arg);
    }

    args.push("-o".into());
    args.push(output.into());
    args.push(input.into());
    args
}

/// Spawn `cmd` and wait for it, killing the child if `budget` runs out.
async fn run_with_timeout(mut cmd: Command, budget: Duration) -> Result<Output> {
    cmd.kill_on_drop(true);
    let child = cmd
        .spawn()
        .map_err(|e| ConvertError::Conversion(format!("failed to spawn converter: {e}")))?;

    match tokio::time::timeout(budget, child.wait_with_output()).await {
        Ok(result) => result
            .map_err(|e| ConvertError::Conversion(format!("failed to wait for converter: {e}"))),
        Err(_) => Err(ConvertError::ConverterTimeout {
            secs: budget.as_secs(),
        }),
    }
}

// ---------------------------------------------------------------------------
// BuiltinMarkdownConverter
// ---------------------------------------------------------------------------

/// In-process HTML to Markdown conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinMarkdownConverter;

#[async_trait]
impl MarkupConverter for BuiltinMarkdownConverter {
    async fn convert(&self, html: &str) -> Result<String> {
        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(vec!["script", "style", "noscript"])
            .build();

        converter
            .convert(html)
            .map_err(|e| ConvertError::Conversion(format!("htmd conversion failed: {e}")))
    }

    fn format(&self) -> MarkupFormat {
        MarkupFormat::Markdown
    }
}
