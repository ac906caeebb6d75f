use async_trait::async_trait;
use research_config::AssistantConfig;
use research_core::{Answerer, ResearchError, ResearchQuery, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Answers queries by running an external program.
///
/// The query is written to the program's stdin as JSON; its stdout is the
/// answer. The child is killed if the call is cancelled.
#[derive(Debug, Clone)]
pub struct CommandAnswerer {
    program: String,
    args: Vec<String>,
}

impl CommandAnswerer {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ResearchError::ConfigError("answer command cannot be empty".into()))?;

        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn from_config(config: &AssistantConfig) -> Option<Result<Self>> {
        config.assistant.answer_command.clone().map(Self::new)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Answerer for CommandAnswerer {
    async fn answer(&self, query: ResearchQuery) -> Result<String> {
        let payload = serde_json::to_vec(&query)?;
        debug!("Running answer command: {} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ResearchError::ExternalQuery(format!("failed to start '{}': {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that answers without reading its input closes the pipe early.
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
                debug!("Answer command closed stdin early");
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(ResearchError::ExternalQuery(detail));
        }

        let answer = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if answer.is_empty() {
            return Err(ResearchError::ExternalQuery(format!(
                "'{}' returned no answer",
                self.program
            )));
        }
        Ok(answer)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandAnswerer {
        CommandAnswerer::new(vec!["sh".into(), "-c".into(), script.into()]).unwrap()
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandAnswerer::new(Vec::new()).is_err());
        assert!(CommandAnswerer::new(vec!["  ".into()]).is_err());
    }

    #[tokio::test]
    async fn test_reads_answer_from_stdout() {
        let answerer = sh("cat > /dev/null; echo 'RAG combines retrieval with generation'");
        let answer = answerer.answer(ResearchQuery::new("what is RAG")).await.unwrap();
        assert_eq!(answer, "RAG combines retrieval with generation");
    }

    #[tokio::test]
    async fn test_query_is_sent_as_json() {
        let answerer = sh("cat");
        let query = ResearchQuery::new("echo me").with_time_label("2025-01-01");
        let answer = answerer.answer(query.clone()).await.unwrap();

        let echoed: ResearchQuery = serde_json::from_str(&answer).unwrap();
        assert_eq!(echoed, query);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_external_error() {
        let answerer = sh("echo 'search API quota exceeded' >&2; exit 3");
        let err = answerer.answer(ResearchQuery::new("q")).await.unwrap_err();
        match err {
            ResearchError::ExternalQuery(message) => {
                assert_eq!(message, "search API quota exceeded")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_external_error() {
        let answerer = CommandAnswerer::new(vec!["/nonexistent/research-agent".into()]).unwrap();
        let err = answerer.answer(ResearchQuery::new("q")).await.unwrap_err();
        assert!(matches!(err, ResearchError::ExternalQuery(_)));
    }

    #[tokio::test]
    async fn test_empty_output_is_error() {
        let answerer = sh("cat > /dev/null");
        assert!(answerer.answer(ResearchQuery::new("q")).await.is_err());
    }
}
