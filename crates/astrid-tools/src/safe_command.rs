//! Safe-command recognizer (C2).
//!
//! A UX gate, not a security boundary — the approval cycle only consults
//! this when the sandbox already provides `IsolationLevel::Full`.

/// First-token allow-list: trivially read-only utilities.
const ALLOWED_COMMANDS: &[&str] = &[
    "ls", "cat", "pwd", "echo", "head", "tail", "wc", "file", "stat", "find", "grep", "which",
];

/// Tokens that, anywhere in the command string, force a manual prompt
/// regardless of the first token — shell metacharacters that could chain
/// into something the allow-list didn't intend.
const FORBIDDEN_TOKENS: &[&str] = &[
    ";", "&&", "||", "|", "`", "$(", "&", ">>", ">", "<<", "<", "\n", "$",
];

/// Returns true only if `cmd`'s first token is on the allow-list and the
/// string contains none of the forbidden shell metacharacters.
#[must_use]
pub fn is_safe(cmd: &str) -> bool {
    let trimmed = cmd.trim();
    if trimmed.is_empty() {
        return false;
    }

    let Some(first_token) = trimmed.split_whitespace().next() else {
        return false;
    };
    if !ALLOWED_COMMANDS.contains(&first_token) {
        return false;
    }

    !FORBIDDEN_TOKENS.iter().any(|tok| trimmed.contains(tok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_plain_read_only_command() {
        assert!(is_safe("ls -la /tmp"));
        assert!(is_safe("cat README.md"));
        assert!(is_safe("grep -r TODO ."));
    }

    #[test]
    fn rejects_unlisted_command() {
        assert!(!is_safe("rm -rf /"));
        assert!(!is_safe("curl http://example.com"));
        assert!(!is_safe("git commit -am wip"));
        assert!(!is_safe("python3 -c \"import os; os.system('rm -rf /')\""));
        assert!(!is_safe("npm install"));
    }

    #[test]
    fn rejects_chained_commands() {
        assert!(!is_safe("ls; rm -rf /"));
        assert!(!is_safe("ls && rm -rf /"));
        assert!(!is_safe("ls || true"));
        assert!(!is_safe("cat file | grep secret"));
    }

    #[test]
    fn rejects_command_substitution_and_redirection() {
        assert!(!is_safe("echo $(whoami)"));
        assert!(!is_safe("echo `whoami`"));
        assert!(!is_safe("echo hi > file"));
        assert!(!is_safe("cat < file"));
        assert!(!is_safe("echo $HOME"));
    }

    #[test]
    fn rejects_backgrounding_and_newlines() {
        assert!(!is_safe("sleep 100 &"));
        assert!(!is_safe("ls\nrm -rf /"));
    }

    #[test]
    fn rejects_empty_command() {
        assert!(!is_safe(""));
        assert!(!is_safe("   "));
    }
}
