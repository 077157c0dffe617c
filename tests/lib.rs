use std::{ffi::OsStr, sync::LazyLock};

use jiff::{Zoned, civil};

mod spans;

static NOW: LazyLock<Zoned> = LazyLock::new(|| {
    civil::date(2024, 7, 20)
        .at(16, 30, 55, 0)
        .in_tz("America/New_York")
        .unwrap()
});

/// Return a command for the `occur` binary and no arguments.
///
/// The environment is pinned so that snapshots are reproducible anywhere:
/// the time zone is New York and the current time is a fixed instant.
fn occur_bare() -> crate::command::Command {
    crate::command::bin("occur")
        .env("TZ", "America/New_York")
        .env("OCCUR_NOW", NOW.to_string())
}

/// Return a command for the `occur` binary with the given arguments
/// appended to it.
fn occur<T: AsRef<OsStr>>(
    args: impl IntoIterator<Item = T>,
) -> crate::command::Command {
    occur_bare().args(args)
}

/// Calling `occur` with no arguments prints the top level usage.
#[test]
fn no_args_prints_usage() {
    crate::command::assert_cmd_snapshot!(
        occur_bare(),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    A utility for expanding iCalendar (RFC 5545) recurrence rules into concrete
    occurrence times.

    USAGE:
        occur <command> ...

    COMMANDS:
        seq    Expand one recurrence rule built from flags
        set    Merge rules and explicit dates into one recurrence set
        spans  Expand a recurring event into (start, end) pairs
    ",
    );
}

#[test]
fn unknown_command_fails() {
    crate::command::assert_cmd_snapshot!(
        occur(["frobnicate"]),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    unrecognized command 'frobnicate'
    ",
    );
}
