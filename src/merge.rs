use serde::Serialize;
use std::io::{self, Write};
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::thread;

pub const DEFAULT_INSTRUCTIONS: &str = "Merge the incoming design-token CSS into the current \
design-token CSS. Keep every custom property of the current section unless the incoming \
section redefines it, take values from the incoming section when both define a property, \
add properties that only the incoming section defines, and keep the @theme, :root and \
.dark-theme blocks in their current order. Return only the merged CSS.";

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("merge command is not configured")]
    NotConfigured,
    #[error("failed to start merge command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to talk to merge command: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode merge request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("merge command exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("merge command produced output that is not UTF-8")]
    NotUtf8,
    #[error("merge command produced no CSS")]
    Empty,
}

pub trait Merger {
    fn merge(&self, current: &str, incoming: &str) -> Result<String, MergeError>;
}

impl<F> Merger for F
where
    F: Fn(&str, &str) -> Result<String, MergeError>,
{
    fn merge(&self, current: &str, incoming: &str) -> Result<String, MergeError> {
        self(current, incoming)
    }
}

/// Takes the incoming section as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceMerger;

impl Merger for ReplaceMerger {
    fn merge(&self, _current: &str, incoming: &str) -> Result<String, MergeError> {
        Ok(incoming.to_string())
    }
}

#[derive(Debug, Serialize)]
struct MergeRequest<'a> {
    instructions: &'a str,
    current: &'a str,
    incoming: &'a str,
}

/// Runs `program args...`, writes a JSON merge request to its stdin and
/// reads the merged CSS from its stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMerger {
    pub program: String,
    pub args: Vec<String>,
    pub instructions: String,
}

impl CommandMerger {
    /// `command` is the program followed by its arguments.
    pub fn from_command(command: &[String], instructions: &str) -> Result<Self, MergeError> {
        let Some((program, args)) = command.split_first() else {
            return Err(MergeError::NotConfigured);
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            instructions: instructions.to_string(),
        })
    }
}

impl Merger for CommandMerger {
    fn merge(&self, current: &str, incoming: &str) -> Result<String, MergeError> {
        let request = serde_json::to_vec(&MergeRequest {
            instructions: &self.instructions,
            current,
            incoming,
        })?;

        tracing::debug!(program = %self.program, bytes = request.len(), "running merge command");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MergeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // write from a second thread while stdout drains
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(|| write_request(stdin, &request));
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        let output = output?;
        if !output.status.success() {
            return Err(MergeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        written.map_err(|_| io::Error::other("merge request writer panicked"))??;

        let stdout = String::from_utf8(output.stdout).map_err(|_| MergeError::NotUtf8)?;
        let merged = clean_output(&stdout);
        if merged.trim().is_empty() {
            return Err(MergeError::Empty);
        }
        Ok(merged.to_string())
    }
}

fn write_request(stdin: Option<ChildStdin>, request: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(request) {
        // the exit status explains why the program stopped reading
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}

/// Drops a surrounding Markdown code fence and trailing line breaks.
pub fn clean_output(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.split_once('\n'))
        .and_then(|(_lang, body)| body.trim_end().strip_suffix("```"));
    match unfenced {
        Some(body) => body.trim_end_matches(['\n', '\r']),
        None => raw.trim_end_matches(['\n', '\r']),
    }
}
