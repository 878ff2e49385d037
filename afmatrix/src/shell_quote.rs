//! Quoting of command lines so that printed build commands can be pasted into a POSIX shell. Only bytes that are
//! never special to the shell are left unquoted, everything else is wrapped in single quotes.

use std::borrow::Cow;

fn is_verbatim(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'=' | b'/' | b',' | b'.' | b'+' | b':' | b'@' | b'%')
}

pub fn quote(arg: &str) -> Cow<str> {
    if arg.is_empty() {
        return Cow::Borrowed("''");
    }
    if arg.bytes().all(is_verbatim) {
        return Cow::Borrowed(arg);
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            // Close the quote, emit an escaped quote and reopen.
            out.push_str(r"'\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    Cow::Owned(out)
}

/// Quotes each argument and joins them with spaces.
pub fn quote_join<'a, I: IntoIterator<Item = &'a str>>(args: I) -> String {
    let mut out = String::new();
    for arg in args {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&quote(arg));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbatim() {
        assert_eq!(
            quote_join(["docker", "--build-arg", "ARCH=amd64", "type=local,dest=out/debian12-cpu-amd64"]),
            "docker --build-arg ARCH=amd64 type=local,dest=out/debian12-cpu-amd64"
        );
    }

    #[test]
    fn empty_string() {
        assert_eq!(quote_join([""]), "''");
    }

    #[test]
    fn spaces_and_quotes() {
        assert_eq!(quote("my dir"), "'my dir'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$HOME"), "'$HOME'");
    }
}
