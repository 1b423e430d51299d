//! Shell hook scripts and injection payloads.
//!
//! A single line defines `__dp_precmd` / `__dp_preexec` and wires them into
//! whichever shell is running: zsh via `precmd_functions`/`preexec_functions`
//! (detected by a non-empty `$ZSH_VERSION`), bash via `PROMPT_COMMAND` and a
//! `DEBUG` trap (non-empty `$BASH_VERSION`). The bash preexec is guarded by
//! `__dp_prompt_shown` so it fires only between a completed prompt and the
//! next command, not for every line of a multi-command pipeline.
//!
//! The script is written to the PTY with a single leading space, which keeps
//! it out of shell history under `HISTCONTROL=ignorespace` /
//! `HIST_IGNORE_SPACE`. Everything still works if those are unset; the hooks
//! merely survive in history and are harmless.

/// The hook installation one-liner. Shell detection happens inline because
/// the payload is typed into an already-running shell of unknown flavor.
pub const HOOK_SCRIPT: &str = concat!(
    "if [ -n \"$ZSH_VERSION\" ]; then ",
    "__dp_precmd() { printf '\\033]7770;precmd;%d\\007' \"$?\"; }; ",
    "__dp_preexec() { printf '\\033]7770;preexec\\007'; }; ",
    "precmd_functions+=(__dp_precmd); preexec_functions+=(__dp_preexec); ",
    "elif [ -n \"$BASH_VERSION\" ]; then ",
    "__dp_prompt_shown=0; ",
    "__dp_precmd() { printf '\\033]7770;precmd;%d\\007' \"$?\"; __dp_prompt_shown=1; }; ",
    "__dp_preexec() { if [ \"$__dp_prompt_shown\" = 1 ]; then __dp_prompt_shown=0; ",
    "printf '\\033]7770;preexec\\007'; fi; }; ",
    "PROMPT_COMMAND=\"__dp_precmd${PROMPT_COMMAND:+;$PROMPT_COMMAND}\"; ",
    "trap '__dp_preexec' DEBUG; ",
    "fi",
);

/// Notice shown in the terminal before hooks are re-injected into an
/// unhooked sub-shell.
pub const REINJECT_NOTICE: &str = "\r\n\x1b[2m[dispatcher] restoring shell integration\x1b[0m\r\n";

/// Steps of the initial injection, in order: suppress echo, pause so the
/// shell drains its input, install hooks, restore echo, clear.
pub fn initial_injection_steps() -> [String; 3] {
    [
        " stty -echo\n".to_string(),
        format!(" {HOOK_SCRIPT}\n"),
        " stty echo && clear\n".to_string(),
    ]
}

/// The re-injection payload typed into the (possibly remote) shell. No
/// `clear` - the user is mid-session and their scrollback stays put.
pub fn reinjection_payload() -> String {
    format!(" {HOOK_SCRIPT}\n")
}
