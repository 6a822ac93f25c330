//! Where the vault secret comes from.

use anyhow::{Context, Result};
use std::io::Read;
use zeroize::Zeroizing;

/// Produces the secret that opens the vault.
pub trait SecretSource {
    fn obtain(&self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Prompt on the controlling terminal without echo.
pub struct TerminalPrompt;

impl SecretSource for TerminalPrompt {
    fn obtain(&self) -> Result<Zeroizing<Vec<u8>>> {
        let password = rpassword::prompt_password("Enter Password: ")
            .map(Zeroizing::new)
            .context("Failed to read password")?;
        Ok(Zeroizing::new(password.as_bytes().to_vec()))
    }
}

/// Secret written to stdin by the parent of a daemon child.
pub struct Handoff;

impl SecretSource for Handoff {
    fn obtain(&self) -> Result<Zeroizing<Vec<u8>>> {
        read_to_end(std::io::stdin().lock()).context("Failed to receive secret from parent")
    }
}

/// Read a secret until end of input.
pub fn read_to_end<R: Read>(mut reader: R) -> std::io::Result<Zeroizing<Vec<u8>>> {
    let mut secret = Zeroizing::new(Vec::new());
    reader.read_to_end(&mut secret)?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_to_end_keeps_bytes_verbatim() {
        let secret = read_to_end(Cursor::new(b"hunter2\n".to_vec())).unwrap();
        assert_eq!(secret.as_slice(), b"hunter2\n");
    }

    #[test]
    fn test_read_empty_input() {
        let secret = read_to_end(std::io::empty()).unwrap();
        assert!(secret.is_empty());
    }
}
