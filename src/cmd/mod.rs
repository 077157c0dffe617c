mod seq;
mod set;
mod spans;

const USAGE: &'static str = "\
A utility for expanding iCalendar (RFC 5545) recurrence rules into concrete
occurrence times.

USAGE:
    occur <command> ...

COMMANDS:
    seq    Expand one recurrence rule built from flags
    set    Merge rules and explicit dates into one recurrence set
    spans  Expand a recurring event into (start, end) pairs
";

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<()> {
    let cmd = crate::args::next_as_command(USAGE, p)?;
    match &*cmd {
        "seq" => seq::run(p),
        "set" => set::run(p),
        "spans" => spans::run(p),
        unk => anyhow::bail!("unrecognized command '{}'", unk),
    }
}
