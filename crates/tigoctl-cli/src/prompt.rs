//! Line-oriented terminal prompts.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Result};

/// One trimmed line, or `None` once the input is closed.
fn read_answer<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Print `label` and read one line. `None` means stdin reached EOF.
pub fn answer(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    Ok(read_answer(&mut io::stdin().lock())?)
}

/// Print `label` and read one trimmed line. EOF is an error.
pub fn line(label: &str) -> Result<String> {
    answer(label)?.ok_or_else(|| anyhow!("Standard input closed"))
}

/// Like `line`, but an empty answer falls back to `default`.
pub fn line_or(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => {
            let answer = line(&format!("{} [{}]: ", label, default))?;
            Ok(if answer.is_empty() {
                default.to_string()
            } else {
                answer
            })
        }
        None => line(&format!("{}: ", label)),
    }
}

pub fn password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(label)?)
}

/// Yes/no question, defaulting to no.
pub fn confirm(question: &str) -> Result<bool> {
    let answer = line(&format!("{} (y/N): ", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes" | "s" | "si"))
}

pub fn pause() -> Result<()> {
    line("\nPress Enter to continue...")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_answer_eof_is_none() {
        let mut input = Cursor::new("");
        assert_eq!(read_answer(&mut input).expect("read"), None);
    }

    #[test]
    fn test_read_answer_empty_line_is_not_eof() {
        let mut input = Cursor::new("\n  3 \n");
        assert_eq!(read_answer(&mut input).expect("read"), Some(String::new()));
        assert_eq!(read_answer(&mut input).expect("read"), Some("3".to_string()));
        assert_eq!(read_answer(&mut input).expect("read"), None);
    }
}
