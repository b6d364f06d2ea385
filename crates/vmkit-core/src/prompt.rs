//! Yes/no confirmation prompts.
//!
//! Prompts are written to stderr so stdout stays clean for reports.
//! When stdin is not a terminal, or reaches EOF, the default answer is used.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

/// Answers yes/no questions. Installer and port killer take one of these.
pub trait Confirm {
    fn confirm(&mut self, question: &str, default: bool) -> bool;
}

/// Render the `[Y/n]` / `[y/N]` suffix for a default.
pub fn choice_hint(default: bool) -> &'static str {
    if default {
        "[Y/n]"
    } else {
        "[y/N]"
    }
}

/// Interpret one line of input. Empty or unrecognised input yields `default`.
pub fn parse_answer(line: &str, default: bool) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

/// Ask `question` on `output`, read one line from `input`.
pub fn confirm_with<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    default: bool,
) -> io::Result<bool> {
    write!(output, "{} {} ", question, choice_hint(default))?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(default);
    }
    Ok(parse_answer(&line, default))
}

/// Ask on the controlling terminal.
pub fn confirm(question: &str, default: bool) -> bool {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return default;
    }
    confirm_with(&mut stdin.lock(), &mut io::stderr(), question, default).unwrap_or(default)
}

/// Interactive prompter on stdin/stderr.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        confirm(question, default)
    }
}

/// Answers yes to everything (`-y`).
#[derive(Debug, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _question: &str, _default: bool) -> bool {
        true
    }
}

/// Pre-recorded answers, for tests. Records every question asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }
}

impl Confirm for ScriptedPrompt {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        self.asked.push(question.to_string());
        self.answers.pop_front().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_answer_variants() {
        assert!(parse_answer("y\n", false));
        assert!(parse_answer("  YES ", false));
        assert!(!parse_answer("n", true));
        assert!(!parse_answer("No\n", true));
        assert!(parse_answer("\n", true));
        assert!(!parse_answer("maybe", false));
    }

    #[test]
    fn confirm_with_writes_question_and_reads_answer() {
        let mut input = Cursor::new(b"y\n".to_vec());
        let mut output = Vec::new();
        let answer =
            confirm_with(&mut input, &mut output, "Kill 1 process(es) on port 3000?", false)
                .unwrap();
        assert!(answer);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Kill 1 process(es) on port 3000? [y/N] "
        );
    }

    #[test]
    fn confirm_with_eof_uses_default() {
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        assert!(confirm_with(&mut input, &mut output, "Install core?", true).unwrap());
        let mut output = Vec::new();
        let mut input = Cursor::new(Vec::new());
        assert!(!confirm_with(&mut input, &mut output, "Kill?", false).unwrap());
    }

    #[test]
    fn scripted_prompt_records_questions() {
        let mut prompt = ScriptedPrompt::new([false]);
        assert!(!prompt.confirm("first?", true));
        assert!(prompt.confirm("second?", true));
        assert_eq!(prompt.asked, vec!["first?", "second?"]);
    }
}
