use async_trait::async_trait;
use services::{ConceptDecision, Learner, LearnerError, LearnerInput};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tutor_core::model::Phase;

/// Learner on the process's stdin/stdout.
pub struct TerminalLearner {
    lines: Lines<BufReader<Stdin>>,
    out: Stdout,
}

impl TerminalLearner {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            out: tokio::io::stdout(),
        }
    }

    async fn say(&mut self, text: &str) -> Result<(), LearnerError> {
        self.out
            .write_all(format!("{text}\n").as_bytes())
            .await
            .map_err(|e| LearnerError::Io(e.to_string()))?;
        self.out
            .flush()
            .await
            .map_err(|e| LearnerError::Io(e.to_string()))
    }

    async fn read_line(&mut self) -> Result<String, LearnerError> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(LearnerError::Closed),
            Err(e) => Err(LearnerError::Io(e.to_string())),
        }
    }

    async fn ask_yes_no(&mut self, prompt: &str) -> Result<bool, LearnerError> {
        loop {
            self.say(&format!("{prompt} [Y/n]")).await?;
            let line = self.read_line().await?;
            if let Some(answer) = parse_yes_no(&line) {
                return Ok(answer);
            }
        }
    }
}

/// Empty input means yes.
fn parse_yes_no(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl Learner for TerminalLearner {
    async fn answer(&mut self, prompt: &str) -> Result<LearnerInput, LearnerError> {
        self.say(&format!("\n{prompt}\n(type /skip to skip)")).await?;
        let line = self.read_line().await?;
        Ok(LearnerInput::parse(&line))
    }

    async fn confirm_continue(&mut self, phase: Phase) -> Result<bool, LearnerError> {
        self.ask_yes_no(&format!("Continue with {phase}?")).await
    }

    async fn concept_decision(&mut self, concept: &str) -> Result<ConceptDecision, LearnerError> {
        let learn = self
            .ask_yes_no(&format!("Next concept: {concept}. Learn it?"))
            .await?;
        Ok(if learn {
            ConceptDecision::Learn
        } else {
            ConceptDecision::Skip
        })
    }

    async fn notify(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(err) = self.say(text).await {
            tracing::debug!(error = %err, "failed to write to terminal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_accepts_common_spellings() {
        assert_eq!(parse_yes_no(""), Some(true));
        assert_eq!(parse_yes_no(" YES "), Some(true));
        assert_eq!(parse_yes_no("n"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }
}
