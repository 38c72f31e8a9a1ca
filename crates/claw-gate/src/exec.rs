// exec.rs — Shell command analysis for the `exec` tool.
//
// Three checks, in the order the orchestrator applies them: shell-wrapped
// invocations are denied outright (a `bash -c` payload hides arbitrary
// commands from argv inspection), argv tokens that look like paths go to
// the path firewall, and destructive verbs with no explicit target are
// denied as likely prompt-injection fallout.

use serde_json::Value;

/// Interpreters whose `-c` flag takes an opaque command string.
const SHELL_INTERPRETERS: &[&str] = &["bash", "sh", "zsh", "dash", "ksh", "fish"];

/// Windows shells with `/c`-style opaque payloads.
const CMD_INTERPRETERS: &[&str] = &["cmd", "cmd.exe"];
const POWERSHELL_INTERPRETERS: &[&str] = &["powershell", "powershell.exe", "pwsh"];

/// Verbs that destroy data and therefore need an explicit target.
const DESTRUCTIVE_VERBS: &[&str] = &[
    "rm", "rmdir", "del", "rd", "format", "mkfs", "dd", "shred", "wipe", "sdelete",
];

/// Build an argv from exec parameters.
///
/// An explicit `argv` array wins; otherwise the `command` string is split
/// on whitespace. The split is deliberately naive — a command that needs
/// shell quoting is exactly the kind of opaque payload the shell-wrap
/// check denies.
pub fn extract_argv(params: &Value) -> Vec<String> {
    if let Some(argv) = params.get("argv").and_then(Value::as_array) {
        return argv
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(command) = params.get("command").and_then(Value::as_str) {
        return command.split_whitespace().map(str::to_string).collect();
    }
    Vec::new()
}

/// Whether the argv invokes a shell with an opaque command payload.
pub fn is_shell_wrapped(argv: &[String]) -> bool {
    let Some(program) = argv.first() else {
        return false;
    };
    let program = basename(program).to_ascii_lowercase();
    let rest = &argv[1..];

    if SHELL_INTERPRETERS.contains(&program.as_str()) {
        return rest.iter().any(|arg| arg == "-c");
    }
    if CMD_INTERPRETERS.contains(&program.as_str()) {
        return rest.iter().any(|arg| arg.eq_ignore_ascii_case("/c"));
    }
    if POWERSHELL_INTERPRETERS.contains(&program.as_str()) {
        return rest
            .iter()
            .any(|arg| arg.eq_ignore_ascii_case("-c") || arg.eq_ignore_ascii_case("-command"));
    }
    false
}

/// The destructive verb, if the command is one and names no target.
///
/// A target is any non-flag token after the verb.
pub fn destructive_without_target(argv: &[String]) -> Option<&str> {
    let program = basename(argv.first()?);
    let verb = DESTRUCTIVE_VERBS
        .iter()
        .copied()
        .find(|verb| program.eq_ignore_ascii_case(verb))?;

    let has_target = argv[1..]
        .iter()
        .any(|arg| !arg.starts_with('-') && !arg.is_empty());
    if has_target {
        None
    } else {
        Some(verb)
    }
}

/// Argv tokens that look like filesystem paths.
///
/// Flags are skipped; everything containing a separator or starting with
/// `~` is handed to the firewall, the program token included.
pub fn path_candidates(argv: &[String]) -> Vec<&str> {
    argv.iter()
        .filter(|token| !token.starts_with('-'))
        .map(String::as_str)
        .filter(|token| {
            token.contains('/') || token.contains('\\') || token.starts_with('~')
        })
        .collect()
}

fn basename(token: &str) -> &str {
    token
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(token)
}
