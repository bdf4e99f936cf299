//! External preprocessing of source documents (XSLT by default).
//!
//! Each run gets its own temporary directory holding the source, the
//! stylesheet and the output. The directory is removed when the run ends,
//! whether it succeeded, failed or timed out. The subprocess is killed when it
//! outlives the configured timeout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SOURCE_FILE: &str = "source.xml";
const TRANSFORM_FILE: &str = "transform.xsl";
const OUTPUT_FILE: &str = "output.xml";
const STDERR_FILE: &str = "stderr.log";

/// Longest pause between two checks on a running subprocess.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Preprocessor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Program to run
    pub program: String,
    /// Arguments; `{source}`, `{transform}` and `{output}` are replaced by
    /// file paths. Without an `{output}` argument, stdout is the output.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// Directory relative stylesheet names are resolved against
    pub stylesheet_dir: Option<PathBuf>,
    /// Stylesheets applied when a mapping names none
    pub stylesheets: Vec<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            program: "xsltproc".to_string(),
            args: vec![
                "--output".to_string(),
                "{output}".to_string(),
                "{transform}".to_string(),
                "{source}".to_string(),
            ],
            timeout_secs: 30,
            stylesheet_dir: None,
            stylesheets: Vec::new(),
        }
    }
}

/// Error type for preprocessing
#[derive(Debug)]
pub enum PreprocessError {
    Io(io::Error),
    Spawn { program: String, error: io::Error },
    Timeout(Duration),
    Failed { status: Option<i32>, stderr: String },
    MissingOutput,
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessError::Io(e) => write!(f, "IO error: {}", e),
            PreprocessError::Spawn { program, error } => {
                write!(f, "Cannot start '{}': {}", program, error)
            }
            PreprocessError::Timeout(after) => {
                write!(f, "Preprocessor killed after {:.1}s", after.as_secs_f64())
            }
            PreprocessError::Failed { status, stderr } => {
                match status {
                    Some(code) => write!(f, "Preprocessor exited with code {}", code)?,
                    None => write!(f, "Preprocessor terminated by signal")?,
                }
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            PreprocessError::MissingOutput => write!(f, "Preprocessor produced no output"),
        }
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreprocessError::Io(e) => Some(e),
            PreprocessError::Spawn { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for PreprocessError {
    fn from(err: io::Error) -> Self {
        PreprocessError::Io(err)
    }
}

/// Runs the configured external program over source documents.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
    timeout: Duration,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self { config, timeout }
    }

    /// Override the timeout from the configuration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Path of a stylesheet, relative names resolved against `stylesheet_dir`.
    pub fn stylesheet_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        match &self.config.stylesheet_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Apply the stylesheet at `stylesheet` to `source`.
    pub fn preprocess(&self, source: &[u8], stylesheet: &Path) -> Result<Vec<u8>, PreprocessError> {
        let transform = fs::read(stylesheet)?;
        self.preprocess_with(source, &transform)
    }

    /// Apply stylesheets in order, each one reading the previous output.
    pub fn preprocess_chain(
        &self,
        source: Vec<u8>,
        stylesheets: &[String],
    ) -> Result<Vec<u8>, PreprocessError> {
        let mut current = source;
        for name in stylesheets {
            let path = self.stylesheet_path(name);
            tracing::info!("Preprocessing source with {}", path.display());
            current = self.preprocess(&current, &path)?;
        }
        Ok(current)
    }

    /// Apply a stylesheet given as bytes to `source`.
    pub fn preprocess_with(&self, source: &[u8], transform: &[u8]) -> Result<Vec<u8>, PreprocessError> {
        let workdir = TempDir::new()?;
        let source_path = workdir.path().join(SOURCE_FILE);
        let transform_path = workdir.path().join(TRANSFORM_FILE);
        let output_path = workdir.path().join(OUTPUT_FILE);
        let stderr_path = workdir.path().join(STDERR_FILE);
        fs::write(&source_path, source)?;
        fs::write(&transform_path, transform)?;

        let mut writes_output = false;
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                writes_output |= arg.contains("{output}");
                arg.replace("{source}", &source_path.to_string_lossy())
                    .replace("{transform}", &transform_path.to_string_lossy())
                    .replace("{output}", &output_path.to_string_lossy())
            })
            .collect();

        let stdout = if writes_output {
            Stdio::null()
        } else {
            Stdio::from(File::create(&output_path)?)
        };

        tracing::debug!("Running {} {:?}", self.config.program, args);
        let mut child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::from(File::create(&stderr_path)?))
            .spawn()
            .map_err(|error| PreprocessError::Spawn {
                program: self.config.program.clone(),
                error,
            })?;

        let status = match wait_with_timeout(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                tracing::warn!(
                    "{} exceeded {:?}, killing it",
                    self.config.program,
                    self.timeout
                );
                // The process may exit between the last poll and the kill.
                let _ = child.kill();
                child.wait()?;
                return Err(PreprocessError::Timeout(self.timeout));
            }
        };

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(PreprocessError::Failed {
                status: status.code(),
                stderr,
            });
        }

        match fs::read(&output_path) {
            Ok(output) if !output.is_empty() => Ok(output),
            Ok(_) => Err(PreprocessError::MissingOutput),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PreprocessError::MissingOutput),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

/// Exit status, or `None` when `timeout` elapsed first.
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    let mut interval = Duration::from_millis(1);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(interval.min(deadline - now));
        interval = (interval * 2).min(MAX_POLL_INTERVAL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, extra: &[&str]) -> Preprocessor {
        let mut args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        Preprocessor::new(PreprocessConfig {
            program: "sh".to_string(),
            args,
            ..PreprocessConfig::default()
        })
    }

    #[test]
    fn test_output_file() {
        let preprocessor = shell(
            r#"tr a-z A-Z < "$1" > "$2""#,
            &["{source}", "{output}"],
        );
        let output = preprocessor.preprocess_with(b"<a>hi</a>", b"").unwrap();
        assert_eq!(output, b"<A>HI</A>");
    }

    #[test]
    fn test_stdout_output() {
        let preprocessor = shell(r#"cat "$1" "$2""#, &["{transform}", "{source}"]);
        let output = preprocessor.preprocess_with(b"<a/>", b"<!-- x -->").unwrap();
        assert_eq!(output, b"<!-- x --><a/>");
    }

    #[test]
    fn test_failure_carries_stderr() {
        let preprocessor = shell("echo boom >&2; exit 3", &[]);
        match preprocessor.preprocess_with(b"<a/>", b"") {
            Err(PreprocessError::Failed { status, stderr }) => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_output() {
        let preprocessor = shell("true", &["{output}"]);
        assert!(matches!(
            preprocessor.preprocess_with(b"<a/>", b""),
            Err(PreprocessError::MissingOutput)
        ));
    }

    #[test]
    fn test_timeout_kills_process() {
        let preprocessor = shell("sleep 5", &[]).with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let result = preprocessor.preprocess_with(b"<a/>", b"");
        assert!(matches!(result, Err(PreprocessError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_spawn_error() {
        let preprocessor = Preprocessor::new(PreprocessConfig {
            program: "metamapper-no-such-program".to_string(),
            ..PreprocessConfig::default()
        });
        assert!(matches!(
            preprocessor.preprocess_with(b"<a/>", b""),
            Err(PreprocessError::Spawn { .. })
        ));
    }

    #[test]
    fn test_workdir_is_removed() {
        let preprocessor = shell(r#"pwd > "$1""#, &["{output}"]);
        let output = preprocessor.preprocess_with(b"<a/>", b"").unwrap();
        let workdir = String::from_utf8(output).unwrap();
        assert!(!Path::new(workdir.trim()).exists());

        let failing = shell(r#"pwd >&2; exit 1"#, &[]);
        match failing.preprocess_with(b"<a/>", b"") {
            Err(PreprocessError::Failed { stderr, .. }) => {
                assert!(!Path::new(stderr.trim()).exists());
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_stylesheet_path() {
        let preprocessor = Preprocessor::new(PreprocessConfig {
            stylesheet_dir: Some(PathBuf::from("/srv/xsl")),
            ..PreprocessConfig::default()
        });
        assert_eq!(
            preprocessor.stylesheet_path("ead.xsl"),
            PathBuf::from("/srv/xsl/ead.xsl")
        );
        assert_eq!(
            preprocessor.stylesheet_path("/tmp/other.xsl"),
            PathBuf::from("/tmp/other.xsl")
        );
    }

    #[test]
    fn test_chain_applies_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.xsl"), "1").unwrap();
        fs::write(dir.path().join("two.xsl"), "2").unwrap();
        let mut preprocessor = shell(r#"cat "$1" "$2""#, &["{source}", "{transform}"]);
        preprocessor.config.stylesheet_dir = Some(dir.path().to_path_buf());

        let output = preprocessor
            .preprocess_chain(b"x".to_vec(), &["one.xsl".to_string(), "two.xsl".to_string()])
            .unwrap();
        assert_eq!(output, b"x12");
    }
}
