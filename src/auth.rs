use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

/// Store password: `KEYCHAIN_PASSWORD`, then the first stdin line, then a
/// TTY prompt.
pub fn read_password() -> Result<Zeroizing<String>> {
    //  KEYCHAIN_PASSWORD="supersecret" keychain list
    if let Ok(pw) = std::env::var("KEYCHAIN_PASSWORD")
        && !pw.is_empty()
    {
        return Ok(Zeroizing::new(pw));
    }

    //  printf "%s\n" "$PW" | keychain list
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    }

    if io::stdin().is_terminal() {
        let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("No password provided")
}

/// Replacement password for `passwd`: `KEYCHAIN_NEW_PASSWORD`, then two
/// matching stdin lines or prompts.
pub fn read_new_password_with_confirmation() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("KEYCHAIN_NEW_PASSWORD")
        && !pw.is_empty()
    {
        return Ok(Zeroizing::new(pw));
    }

    if !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut pw1 = Zeroizing::new(String::new());
        let mut pw2 = Zeroizing::new(String::new());

        handle.read_line(&mut pw1)?;
        handle.read_line(&mut pw2)?;

        trim_newline(&mut pw1);
        trim_newline(&mut pw2);

        return confirm(pw1, pw2);
    }

    let pw1 = Zeroizing::new(rpassword::prompt_password("New password: ")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);

    confirm(pw1, pw2)
}

fn confirm(pw1: Zeroizing<String>, pw2: Zeroizing<String>) -> Result<Zeroizing<String>> {
    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_newline_strips_crlf() {
        let mut s = String::from("pw\r\n");
        trim_newline(&mut s);
        assert_eq!(s, "pw");
    }

    #[test]
    fn confirm_rejects_mismatch_and_empty() {
        let z = |s: &str| Zeroizing::new(s.to_string());

        assert!(confirm(z("a"), z("b")).is_err());
        assert!(confirm(z(""), z("")).is_err());
        assert_eq!(confirm(z("a"), z("a")).unwrap().as_str(), "a");
    }
}
