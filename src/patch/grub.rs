//! `/etc/default/grub` editing.

/// Kernel parameter routing the console to the first serial port.
pub const SERIAL_CONSOLE: &str = "console=ttyS0,115200n8";

/// Substring that counts as "a serial console is already configured".
const SERIAL_CONSOLE_MARKER: &str = "console=ttyS0";

const CMDLINE_VAR: &str = "GRUB_CMDLINE_LINUX=";

/// Split `value # comment` at the first `#` that starts a shell comment.
///
/// A `#` only starts a comment outside quotes and after whitespace. The
/// second half keeps its leading whitespace so it can be glued back as is.
fn split_comment(value: &str) -> (&str, &str) {
    let mut quote = None;
    let mut prev_blank = false;
    for (i, c) in value.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') if prev_blank => {
                let code = value[..i].trim_end();
                return (code, &value[code.len()..]);
            }
            _ => {}
        }
        prev_blank = c.is_whitespace();
    }
    (value.trim_end(), "")
}

/// Append `param` to a shell-style variable value, keeping its quoting.
fn append_to_value(value: &str, param: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            let inner = &value[1..value.len() - 1];
            return if inner.trim().is_empty() {
                format!("{quote}{param}{quote}")
            } else {
                format!("{quote}{inner} {param}{quote}")
            };
        }
    }
    if value.is_empty() {
        format!("\"{param}\"")
    } else {
        format!("\"{value} {param}\"")
    }
}

/// Make sure `GRUB_CMDLINE_LINUX` carries a serial console parameter.
///
/// Returns `None` when the file already has one. When the variable is
/// missing entirely a new assignment is appended. `GRUB_CMDLINE_LINUX_DEFAULT`
/// is left alone.
pub fn ensure_serial_console(content: &str) -> Option<String> {
    let mut found = false;
    let mut changed = false;

    let mut lines: Vec<String> = content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            let Some(value) = trimmed.strip_prefix(CMDLINE_VAR) else {
                return line.to_string();
            };
            found = true;
            let (value, comment) = split_comment(value);
            if value.contains(SERIAL_CONSOLE_MARKER) {
                return line.to_string();
            }
            changed = true;
            let indent = &line[..line.len() - trimmed.len()];
            format!(
                "{}{}{}{}",
                indent,
                CMDLINE_VAR,
                append_to_value(value, SERIAL_CONSOLE),
                comment
            )
        })
        .collect();

    if !found {
        let assignment = format!("{}\"{}\"", CMDLINE_VAR, SERIAL_CONSOLE);
        // Keep a trailing newline trailing
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.insert(lines.len() - 1, assignment);
        } else {
            lines.push(assignment);
        }
        changed = true;
    }

    changed.then(|| lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRUB: &str = "\
GRUB_TIMEOUT=5
GRUB_DISTRIBUTOR=\"$(sed 's, release .*$,,g' /etc/system-release)\"
GRUB_DEFAULT=saved
GRUB_CMDLINE_LINUX=\"crashkernel=auto rd.lvm.lv=centos/root rhgb quiet\"
GRUB_DISABLE_RECOVERY=\"true\"
";

    #[test]
    fn test_appends_inside_quotes() {
        let patched = ensure_serial_console(GRUB).unwrap();
        assert!(patched.contains(
            "GRUB_CMDLINE_LINUX=\"crashkernel=auto rd.lvm.lv=centos/root rhgb quiet console=ttyS0,115200n8\"\n"
        ));
        assert!(patched.starts_with("GRUB_TIMEOUT=5\n"));
        assert!(patched.ends_with("GRUB_DISABLE_RECOVERY=\"true\"\n"));
    }

    #[test]
    fn test_existing_console_is_kept() {
        let content = "GRUB_CMDLINE_LINUX=\"quiet console=ttyS0,9600\"\n";
        assert_eq!(ensure_serial_console(content), None);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let once = ensure_serial_console(GRUB).unwrap();
        assert_eq!(ensure_serial_console(&once), None);
    }

    #[test]
    fn test_default_variant_not_touched() {
        let content = "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet\"\nGRUB_CMDLINE_LINUX=\"\"\n";
        let patched = ensure_serial_console(content).unwrap();
        assert_eq!(
            patched,
            "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet\"\nGRUB_CMDLINE_LINUX=\"console=ttyS0,115200n8\"\n"
        );
    }

    #[test]
    fn test_single_quotes_and_unquoted() {
        assert_eq!(
            ensure_serial_console("GRUB_CMDLINE_LINUX='rhgb'").unwrap(),
            "GRUB_CMDLINE_LINUX='rhgb console=ttyS0,115200n8'"
        );
        assert_eq!(
            ensure_serial_console("GRUB_CMDLINE_LINUX=rhgb").unwrap(),
            "GRUB_CMDLINE_LINUX=\"rhgb console=ttyS0,115200n8\""
        );
    }

    #[test]
    fn test_trailing_comment_stays_outside_quotes() {
        assert_eq!(
            ensure_serial_console("GRUB_CMDLINE_LINUX=\"rhgb quiet\" # tuned\n").unwrap(),
            "GRUB_CMDLINE_LINUX=\"rhgb quiet console=ttyS0,115200n8\" # tuned\n"
        );
        assert_eq!(
            ensure_serial_console("GRUB_CMDLINE_LINUX=rhgb   #old box\n").unwrap(),
            "GRUB_CMDLINE_LINUX=\"rhgb console=ttyS0,115200n8\"   #old box\n"
        );
    }

    #[test]
    fn test_hash_inside_quotes_is_not_a_comment() {
        assert_eq!(
            ensure_serial_console("GRUB_CMDLINE_LINUX=\"rd.luks.key=/k #1\"").unwrap(),
            "GRUB_CMDLINE_LINUX=\"rd.luks.key=/k #1 console=ttyS0,115200n8\""
        );
    }

    #[test]
    fn test_console_in_comment_does_not_count() {
        assert_eq!(
            ensure_serial_console("GRUB_CMDLINE_LINUX=\"quiet\" # console=ttyS0 removed").unwrap(),
            "GRUB_CMDLINE_LINUX=\"quiet console=ttyS0,115200n8\" # console=ttyS0 removed"
        );
    }

    #[test]
    fn test_missing_variable_is_added() {
        let patched = ensure_serial_console("GRUB_TIMEOUT=5\n").unwrap();
        assert_eq!(
            patched,
            "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX=\"console=ttyS0,115200n8\"\n"
        );
    }
}
