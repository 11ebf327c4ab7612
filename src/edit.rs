//! Line-oriented commands for driving an [`EditSession`]

use std::io::{BufRead, Write};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::grouping::{Group, ToggleCase};
use crate::session::EditSession;

pub const HELP: &str = "\
Commands:
  show              print the current groups
  toggle <p>        toggle the boundary between pages p and p+1
  split <p,...>     groups end at the given pages (none: one group)
  reset             every page on its own
  ranges            print the groups as page ranges
  commit            export the groups and leave
  abort             leave without exporting
  help              this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    Show,
    Toggle(u32),
    Split(Vec<u32>),
    Reset,
    Ranges,
    Commit,
    Abort,
    Help,
}

fn parse_page(s: &str) -> Result<u32> {
    s.trim()
        .parse()
        .map_err(|_| Error::General(format!("Not a page number: {}", s.trim())))
}

impl FromStr for EditCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match word.to_ascii_lowercase().as_str() {
            "show" | "s" => Ok(Self::Show),
            "toggle" | "t" => Ok(Self::Toggle(parse_page(rest)?)),
            "split" => {
                let points = rest
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|part| !part.is_empty())
                    .map(parse_page)
                    .collect::<Result<Vec<u32>>>()?;
                Ok(Self::Split(points))
            }
            "reset" => Ok(Self::Reset),
            "ranges" => Ok(Self::Ranges),
            "commit" => Ok(Self::Commit),
            "abort" | "quit" | "q" => Ok(Self::Abort),
            "help" | "?" => Ok(Self::Help),
            _ => Err(Error::General(format!("Unknown command: {}", word))),
        }
    }
}

/// What the editor does after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStep {
    /// Keep editing, printing the message
    Continue(String),
    Commit,
    Abort,
}

fn describe_toggle(case: ToggleCase, page: u32) -> String {
    match case {
        ToggleCase::Split => format!("Split apart at pages {} and {}", page, page + 1),
        ToggleCase::Merge => format!("Merged the groups of pages {} and {}", page, page + 1),
        ToggleCase::Absorb => format!("Joined pages {} and {}", page, page + 1),
        ToggleCase::Pair => format!("Paired pages {} and {}", page, page + 1),
    }
}

/// Groups with the sources their pages come from
pub fn describe_groups(session: &EditSession) -> String {
    let inventory = session.inventory();
    session
        .partition()
        .groups()
        .iter()
        .enumerate()
        .map(|(position, group)| {
            let pages: Vec<String> = group
                .sorted_members()
                .into_iter()
                .filter_map(|number| inventory.page(number))
                .map(|page| {
                    format!(
                        "{}:{}",
                        inventory.source_of(page).filename,
                        page.page_index
                    )
                })
                .collect();
            format!("{:>3}. {}  {}", position + 1, group, pages.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_ranges(session: &EditSession) -> String {
    match session.partition().ranges() {
        Some(ranges) => ranges
            .iter()
            .map(|range| format!("{}-{}", range.start, range.end))
            .collect::<Vec<_>>()
            .join(", "),
        None => {
            let loose: Vec<String> = session
                .partition()
                .groups()
                .iter()
                .filter(|group| !group.is_contiguous())
                .map(Group::to_string)
                .collect();
            format!("Not expressible as ranges: {}", loose.join(" "))
        }
    }
}

impl EditCommand {
    /// Apply to `session`. Rejected edits leave the session unchanged.
    pub fn apply(self, session: &mut EditSession) -> Result<EditStep> {
        let message = match self {
            Self::Show => describe_groups(session),
            Self::Toggle(page) => {
                let case = session.toggle(page)?;
                format!("{}\n{}", describe_toggle(case, page), session.partition())
            }
            Self::Split(points) => {
                session.set_split_points(&points)?;
                session.partition().to_string()
            }
            Self::Reset => {
                session.reset();
                session.partition().to_string()
            }
            Self::Ranges => describe_ranges(session),
            Self::Help => HELP.to_string(),
            Self::Commit => return Ok(EditStep::Commit),
            Self::Abort => return Ok(EditStep::Abort),
        };
        Ok(EditStep::Continue(message))
    }
}

/// How an edit loop ended
#[derive(Debug)]
pub enum EditEnd {
    /// The session to export
    Commit(EditSession),
    /// Aborted, or input ran out
    Abort,
}

/// Read commands from `input` until commit, abort or end of input.
/// Bad commands are reported on `output` and editing continues.
pub fn run_edit_loop<R, W>(mut session: EditSession, input: R, mut output: W) -> Result<EditEnd>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "{}", describe_groups(&session))?;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let step = line
            .parse::<EditCommand>()
            .and_then(|command| command.apply(&mut session));
        match step {
            Ok(EditStep::Continue(message)) => writeln!(output, "{}", message)?,
            Ok(EditStep::Commit) => return Ok(EditEnd::Commit(session)),
            Ok(EditStep::Abort) => break,
            Err(e) => writeln!(output, "error: {}", e)?,
        }
    }
    Ok(EditEnd::Abort)
}
