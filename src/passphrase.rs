//! Passphrase prompting
//!
//! Prompting is blocking: `read_passphrase` returns only once the user has
//! answered or dismissed the prompt.

use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::rc::Rc;
use zeroize::Zeroizing;

/// Trait for asking the user for a passphrase
pub trait PassphraseReader {
    /// Ask for a passphrase, showing `title` to the user.
    ///
    /// Returns `Ok(None)` if the user cancelled. The passphrase is wrapped in
    /// `Zeroizing` so it is wiped from memory when dropped.
    fn read_passphrase(&mut self, title: &str) -> Result<Option<Zeroizing<String>>>;

    /// Tell the user the last passphrase they entered was wrong.
    fn report_incorrect(&mut self) {}
}

/// Replays a fixed sequence of answers (for tests and headless callers)
///
/// `None` entries act as a cancel. Once the answers run out the reader
/// keeps returning its fallback, which is a cancel unless built with
/// `constant`.
pub struct ScriptedPassphraseReader {
    answers: VecDeque<Option<Zeroizing<String>>>,
    fallback: Option<Zeroizing<String>>,
    prompts: Rc<Cell<usize>>,
    incorrect: Rc<Cell<usize>>,
}

impl ScriptedPassphraseReader {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: answers
                .into_iter()
                .map(|a| a.map(|s| Zeroizing::new(s.into())))
                .collect(),
            fallback: None,
            prompts: Rc::new(Cell::new(0)),
            incorrect: Rc::new(Cell::new(0)),
        }
    }

    /// A reader that always gives the same answer.
    pub fn constant(passphrase: &str) -> Self {
        let mut reader = Self::new(std::iter::empty::<Option<String>>());
        reader.fallback = Some(Zeroizing::new(passphrase.to_owned()));
        reader
    }

    /// Handle to the number of prompts shown so far.
    pub fn prompt_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.prompts)
    }

    /// Handle to the number of "incorrect passphrase" reports so far.
    pub fn incorrect_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.incorrect)
    }
}

impl PassphraseReader for ScriptedPassphraseReader {
    fn read_passphrase(&mut self, _title: &str) -> Result<Option<Zeroizing<String>>> {
        self.prompts.set(self.prompts.get() + 1);
        match self.answers.pop_front() {
            Some(answer) => Ok(answer),
            None => Ok(self.fallback.clone()),
        }
    }

    fn report_incorrect(&mut self) {
        self.incorrect.set(self.incorrect.get() + 1);
    }
}

/// Reads one passphrase per line from any buffered reader
///
/// End of input is treated as a cancel.
pub struct ReaderPassphraseReader {
    reader: Box<dyn BufRead>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self, _title: &str) -> Result<Option<Zeroizing<String>>> {
        let mut line = Zeroizing::new(String::new());
        let n = self.reader.read_line(&mut line).map_err(|e| {
            PassvaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        Ok(Some(Zeroizing::new(trimmed.to_owned())))
    }
}

/// Reads passphrase from terminal with no echo
pub struct TerminalPassphraseReader;

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    /// Read passphrase from terminal.
    ///
    /// End of input (Ctrl-D) cancels the prompt.
    fn read_passphrase(&mut self, title: &str) -> Result<Option<Zeroizing<String>>> {
        if !io::stdin().is_terminal() {
            return Err(PassvaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        write_stderr(format!("{}: ", title).as_bytes())?;

        // rpassword returns a plain String; wrap it immediately
        match rpassword::read_password() {
            Ok(passphrase) => Ok(Some(Zeroizing::new(passphrase))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(PassvaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase: {}", e),
                e,
            )),
        }
    }

    fn report_incorrect(&mut self) {
        let _ = write_stderr(b"Incorrect master passphrase.\n");
    }
}

fn write_stderr(msg: &[u8]) -> Result<()> {
    let mut stderr = io::stderr();
    stderr
        .write_all(msg)
        .and_then(|()| stderr.flush())
        .map_err(|e| {
            PassvaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })
}
