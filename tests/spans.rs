use crate::command::assert_cmd_snapshot;

fn spans() -> crate::command::Command {
    crate::occur(["spans"])
}

#[test]
fn pairs_starts_with_ends() {
    assert_cmd_snapshot!(
        spans().args([
            "FREQ=DAILY;COUNT=3",
            "--start",
            "2024-06-03T09:00",
            "--end",
            "2024-06-03T10:00",
        ]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    2024-06-03T09:00:00-04:00[America/New_York]	2024-06-03T10:00:00-04:00[America/New_York]
    2024-06-04T09:00:00-04:00[America/New_York]	2024-06-04T10:00:00-04:00[America/New_York]
    2024-06-05T09:00:00-04:00[America/New_York]	2024-06-05T10:00:00-04:00[America/New_York]

    ----- stderr -----
    ",
    );
}

#[test]
fn json_lines() {
    assert_cmd_snapshot!(
        spans().args([
            "FREQ=DAILY;COUNT=2",
            "--start",
            "2024-06-03T09:00",
            "--end",
            "2024-06-03T10:00",
            "--json",
        ]),
        @r#"
    success: true
    exit_code: 0
    ----- stdout -----
    {"index":0,"start":"2024-06-03T09:00:00-04:00[America/New_York]","end":"2024-06-03T10:00:00-04:00[America/New_York]"}
    {"index":1,"start":"2024-06-04T09:00:00-04:00[America/New_York]","end":"2024-06-04T10:00:00-04:00[America/New_York]"}

    ----- stderr -----
    "#,
    );
}

#[test]
fn window_keeps_only_matching_occurrences() {
    assert_cmd_snapshot!(
        spans().args([
            "FREQ=DAILY;COUNT=10",
            "--start",
            "2024-06-01T09:00",
            "--after",
            "2024-06-03T00:00",
            "--before",
            "2024-06-05T23:59",
        ]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    2024-06-03T09:00:00-04:00[America/New_York]	2024-06-03T09:00:00-04:00[America/New_York]
    2024-06-04T09:00:00-04:00[America/New_York]	2024-06-04T09:00:00-04:00[America/New_York]
    2024-06-05T09:00:00-04:00[America/New_York]	2024-06-05T09:00:00-04:00[America/New_York]

    ----- stderr -----
    ",
    );
}

/// The virtual limit is what keeps a rule with no COUNT or UNTIL finite.
#[test]
fn virtual_limit_caps_output() {
    assert_cmd_snapshot!(
        spans().args([
            "FREQ=DAILY",
            "--start",
            "2024-06-01T09:00",
            "--virtual-limit",
            "2",
        ]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    2024-06-01T09:00:00-04:00[America/New_York]	2024-06-01T09:00:00-04:00[America/New_York]
    2024-06-02T09:00:00-04:00[America/New_York]	2024-06-02T09:00:00-04:00[America/New_York]

    ----- stderr -----
    ",
    );
}

/// With `--no-count-misses`, occurrences dropped by the window do not use
/// up the rule's COUNT, so the full complement lands inside it.
#[test]
fn no_count_misses_preserves_count() {
    assert_cmd_snapshot!(
        spans().args([
            "FREQ=DAILY;COUNT=3",
            "--start",
            "2024-06-01T09:00",
            "--after",
            "2024-06-03T09:00",
            "--exclusive",
            "--no-count-misses",
        ]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    2024-06-04T09:00:00-04:00[America/New_York]	2024-06-04T09:00:00-04:00[America/New_York]
    2024-06-05T09:00:00-04:00[America/New_York]	2024-06-05T09:00:00-04:00[America/New_York]
    2024-06-06T09:00:00-04:00[America/New_York]	2024-06-06T09:00:00-04:00[America/New_York]

    ----- stderr -----
    ",
    );
}

#[test]
fn missing_rule_fails() {
    assert_cmd_snapshot!(
        spans(),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    missing required <rule>
    ",
    );
}
