//! Program output and console input.

use std::fmt;
use std::io::{self, BufRead};

use crate::error::RuntimeError;

/// Where `ask` reads lines from.
pub enum Input {
    /// The process's standard input
    Stdin,
    /// Any buffered reader, typically used by tests and embedders
    Reader(Box<dyn BufRead + Send>),
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Stdin => write!(f, "Stdin"),
            Input::Reader(_) => write!(f, "Reader"),
        }
    }
}

/// The console seen by syscalls.
///
/// Everything written is kept in an output buffer whether or not it is
/// also echoed to stdout.
#[derive(Debug)]
pub struct Console {
    output: String,
    echo: bool,
    input: Input,
}

impl Console {
    /// Creates a console reading from stdin.
    pub fn new(echo: bool) -> Self {
        Self {
            output: String::new(),
            echo,
            input: Input::Stdin,
        }
    }

    /// Appends `text` and a newline to the output.
    pub fn write_line(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
        if self.echo {
            println!("{}", text);
        }
    }

    /// Reads one line without its terminator. End of input reads as an
    /// empty line.
    pub fn read_line(&mut self) -> Result<String, RuntimeError> {
        let mut line = String::new();
        let read = match &mut self.input {
            Input::Stdin => io::stdin().lock().read_line(&mut line),
            Input::Reader(reader) => reader.read_line(&mut line),
        };
        read.map_err(|e| RuntimeError::Input(e.to_string()))?;

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    /// Replaces the input source.
    pub fn set_input(&mut self, input: Input) {
        self.input = input;
    }

    /// Turns stdout mirroring on or off.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Everything written so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Clears the output buffer.
    pub fn clear(&mut self) {
        self.output.clear();
    }
}
