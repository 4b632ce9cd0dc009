use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

/// Obtains the main password from the environment, a pipe, or a TTY prompt.
///
///  PWCRYPT_MAIN_PASSWORD="secret" pwcrypt get mail
///  echo "secret" | pwcrypt get mail
pub fn read_main_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("PWCRYPT_MAIN_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);
        if !buf.is_empty() {
            return Ok(buf);
        }
    }

    if io::stdin().is_terminal() {
        let pw = rpassword::prompt_password("Main password: ")?;
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    bail!("no main password provided")
}

/// Reads a new main password twice and checks that both entries match.
///
/// Non-interactive callers supply the two lines on stdin.
pub fn read_new_main_password() -> Result<Zeroizing<String>> {
    let (pw1, pw2) = if io::stdin().is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password("New main password: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm main password: ")?),
        )
    } else {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut pw1 = Zeroizing::new(String::new());
        let mut pw2 = Zeroizing::new(String::new());
        handle.read_line(&mut pw1)?;
        handle.read_line(&mut pw2)?;
        trim_newline(&mut pw1);
        trim_newline(&mut pw2);
        (pw1, pw2)
    };

    if pw1.is_empty() {
        bail!("main password cannot be empty");
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
