use crate::{DsError, Result};
use std::io::{self, BufRead, Write};

/// What the operator wants to do next during a stick-center calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAction {
    /// Take another sample at the current stick position.
    Sample,
    /// Store the calibration and finish.
    Store,
}

/// Decisions taken by the person holding the controller.
///
/// Calibration procedures block on these calls; there is no timeout.
pub trait Operator {
    fn choose_stick_action(&mut self) -> Result<StickAction>;

    /// Show `message` and wait for the operator to acknowledge it.
    fn confirm(&mut self, message: &str) -> Result<()>;
}

/// Operator prompts on a line-oriented terminal.
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl TerminalOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `prompt` and return the next input line without its newline.
    pub fn prompt_line(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        self.read_line()
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(DsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn choose_stick_action(&mut self) -> Result<StickAction> {
        loop {
            writeln!(
                self.output,
                "Press S to sample data or W to store calibration (followed by enter)"
            )?;
            let line = self.prompt_line("> ")?;
            match line.trim().to_ascii_uppercase().as_str() {
                "S" => return Ok(StickAction::Sample),
                "W" => return Ok(StickAction::Store),
                _ => writeln!(self.output, "Invalid command")?,
            }
        }
    }

    fn confirm(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        self.output.flush()?;
        self.read_line().map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stick_action_reprompts_on_invalid_input() {
        let mut out = Vec::new();
        let mut op = TerminalOperator::new(Cursor::new("x\ns\nW\n"), &mut out);
        assert_eq!(op.choose_stick_action().unwrap(), StickAction::Sample);
        assert_eq!(op.choose_stick_action().unwrap(), StickAction::Store);
        drop(op);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Invalid command").count(), 1);
    }

    #[test]
    fn test_closed_input_is_an_error() {
        let mut op = TerminalOperator::new(Cursor::new(""), Vec::new());
        assert!(op.confirm("press enter").unwrap_err().is_transfer_failure());
    }

    #[test]
    fn test_prompt_line() {
        let mut op = TerminalOperator::new(Cursor::new("2\r\n"), Vec::new());
        assert_eq!(op.prompt_line("> ").unwrap(), "2");
    }
}
