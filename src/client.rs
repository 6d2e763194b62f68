use std::io::{self, BufRead, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::wire::{self, Operation, Request, Response};

/// One connection to the server, used for one request at a time.
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)?;
        debug!("connected to {}", path.display());
        Ok(Client { stream })
    }

    /// Sends `request` and waits for its response. Use [`Client::exit`] to
    /// end the session instead of calling with the exit operation.
    pub fn call(&mut self, request: &Request) -> Result<Response> {
        if request.op == Operation::Exit {
            return Err(Error::ExitHasNoReply);
        }
        wire::write_request(&mut self.stream, request)?;
        wire::read_response(&mut self.stream)?.ok_or(Error::Eof)
    }

    // Ends the session. The server closes the connection without replying.
    pub fn exit(mut self) -> Result<()> {
        wire::write_request(&mut self.stream, &Request::exit())
    }
}

// Connects, sends one request, and ends the session. The exit operation is
// refused before any connection is made.
pub fn call_once(config: &ClientConfig, request: &Request) -> Result<Response> {
    if request.op == Operation::Exit {
        return Err(Error::ExitHasNoReply);
    }
    let mut client = Client::connect(&config.socket_path)?;
    let response = client.call(request)?;
    client.exit()?;
    Ok(response)
}

// Whitespace-separated tokens across lines, the way scanf("%s") reads them.
struct Tokens<R> {
    input: R,
    pending: Vec<String>,
}

impl<R: BufRead> Tokens<R> {
    fn new(input: R) -> Self {
        Tokens {
            input,
            pending: Vec::new(),
        }
    }

    fn next_token(&mut self) -> io::Result<Option<String>> {
        while self.pending.is_empty() {
            let mut line = Vec::new();
            if self.input.read_until(b'\n', &mut line)? == 0 {
                return Ok(None);
            }
            // Bytes that are not UTF-8 become U+FFFD and fail to parse later.
            self.pending = String::from_utf8_lossy(&line)
                .split_whitespace()
                .rev()
                .map(String::from)
                .collect();
        }
        Ok(self.pending.pop())
    }
}

enum Operand {
    Value(i32),
    Invalid(String),
    End,
}

fn prompt_operand<R: BufRead, W: Write>(
    tokens: &mut Tokens<R>,
    output: &mut W,
    prompt: &str,
) -> Result<Operand> {
    write!(output, "{}", prompt)?;
    output.flush()?;
    Ok(match tokens.next_token()? {
        Some(token) => match token.parse::<i32>() {
            Ok(value) => Operand::Value(value),
            Err(_) => Operand::Invalid(token),
        },
        None => Operand::End,
    })
}

// Interactive loop: prompt for an operation and two operands, send the
// request and print the answer. Ends on `exit` or end of input, either of
// which sends the exit request.
pub fn run_session<R: BufRead, W: Write>(
    mut client: Client,
    input: R,
    output: &mut W,
) -> Result<()> {
    let mut tokens = Tokens::new(input);

    'session: loop {
        write!(output, "\nEnter operation (add/sub/mul/div) or 'exit': ")?;
        output.flush()?;
        let keyword = match tokens.next_token()? {
            Some(keyword) => keyword,
            None => {
                writeln!(output)?;
                break;
            }
        };

        let op = Operation::from_keyword(&keyword);
        if op == Operation::Exit {
            break;
        }

        let mut operands = [0i32; 2];
        let mut complete = true;
        for (slot, prompt) in operands
            .iter_mut()
            .zip(["Enter operand1: ", "Enter operand2: "])
        {
            match prompt_operand(&mut tokens, output, prompt)? {
                Operand::Value(value) => *slot = value,
                Operand::Invalid(token) => {
                    writeln!(output, "Invalid number: {}", token)?;
                    complete = false;
                    break;
                }
                Operand::End => {
                    writeln!(output)?;
                    break 'session;
                }
            }
        }
        if !complete {
            continue;
        }

        let response = client.call(&Request::new(op, operands[0], operands[1]))?;
        if response.valid {
            writeln!(output, "Result: {}", response.result)?;
        } else {
            writeln!(output, "Error from server (invalid op or divide-by-zero)")?;
        }
    }

    client.exit()?;
    writeln!(output, "Client exiting.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tokens_span_lines_and_spaces() {
        let mut tokens = Tokens::new(Cursor::new("add 3\n\n  4\nexit"));
        let mut seen = Vec::new();
        while let Some(token) = tokens.next_token().unwrap() {
            seen.push(token);
        }
        assert_eq!(seen, ["add", "3", "4", "exit"]);
    }

    #[test]
    fn invalid_utf8_becomes_a_replacement_token() {
        let mut tokens = Tokens::new(Cursor::new(b"\xff\xfe 3\nexit\n".to_vec()));
        assert_eq!(tokens.next_token().unwrap().unwrap(), "\u{fffd}\u{fffd}");
        assert_eq!(tokens.next_token().unwrap().unwrap(), "3");
        assert_eq!(tokens.next_token().unwrap().unwrap(), "exit");
        assert!(tokens.next_token().unwrap().is_none());
    }

    #[test]
    fn call_once_refuses_exit_without_connecting() {
        let config = ClientConfig::new("/nonexistent/arith.sock");
        assert!(matches!(
            call_once(&config, &Request::exit()),
            Err(Error::ExitHasNoReply)
        ));
    }
}
