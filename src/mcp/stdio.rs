//! stdio transport for the MCP server.
//!
//! One JSON object per newline-terminated line on stdin; one response
//! per non-notification request on stdout. Per-message failures are
//! answered in-band and never end the loop — only a stream error does.

use crate::mcp::server::McpServer;
use std::io::{self, BufRead, BufReader, Write};
use tracing::{debug, error};

/// Environment variable enabling verbose transport logging to stderr.
pub const DEBUG_ENV: &str = "AGRAMA_DEBUG";

/// stdio transport.
pub struct StdioTransport {
    verbose: bool,
}

impl StdioTransport {
    /// Create a transport, reading the debug toggle from the environment.
    pub fn new() -> Self {
        let verbose = std::env::var(DEBUG_ENV).map(|v| v == "1" || v == "true").unwrap_or(false);
        Self { verbose }
    }

    /// Run the server over stdin/stdout until the input stream ends.
    pub fn run(self, mut server: McpServer) -> Result<(), io::Error> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let reader = BufReader::new(stdin.lock());
        let mut stdout = stdout.lock();

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    error!("stream error, ending loop: {err}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if self.verbose {
                eprintln!("agrama <- {line}");
            }
            debug!("received {} bytes", line.len());

            let Some(response_json) = server.handle_raw(&line) else {
                continue;
            };
            if self.verbose {
                eprintln!("agrama -> {response_json}");
            }
            writeln!(stdout, "{response_json}")?;
            stdout.flush()?;
        }

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}
