use std::io::{self, BufRead, Write};

use pgcluster_converge::confirm::Prompt;

/// Asks on stdout, reads one line from stdin. Blocks the calling thread;
/// setup asks every question before replicas converge concurrently.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&self, question: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{} ", question)?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            writeln!(stdout)?;
            return Ok(None);
        }
        Ok(Some(input))
    }
}
