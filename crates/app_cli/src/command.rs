use std::path::PathBuf;

use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Docs,
    Refresh,
    Upload(Vec<PathBuf>),
    /// `None` clears the active document.
    Use(Option<String>),
    Ask(String),
    Summarize,
    KeyPoints,
    /// Empty text asks the user for a query.
    Search(String),
    Preview(String),
    More(String),
    Less(String),
    Remove(String),
    Download {
        id: String,
        dir: Option<PathBuf>,
    },
    History,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  docs                     list uploaded documents (* marks the active one)
  refresh                  reload the document list from the server
  upload <path>...         upload pdf, docx or txt files (10 MB max each)
  use <id> | use none      scope questions to one document, or to all
  ask <question>           ask about the active document (or all documents)
  summarize                summarize all documents
  keypoints                list the key points of all documents
  search <text>            search the documents
  preview <id>             open or close the text preview of a document
  more <id> / less <id>    show more or fewer preview chunks
  rm <id>                  delete a document
  download <id> [dir]      save the original file (default: current dir)
  history                  print the conversation so far
  help                     show this help
  quit                     leave";

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "docs" | "ls" => Command::Docs,
        "refresh" => Command::Refresh,
        "upload" => {
            if rest.is_empty() {
                bail!("usage: upload <path>...");
            }
            Command::Upload(rest.split_whitespace().map(PathBuf::from).collect())
        }
        "use" => match rest {
            "" => bail!("usage: use <id> | use none"),
            "none" | "all" => Command::Use(None),
            id => Command::Use(Some(id.to_string())),
        },
        "ask" => Command::Ask(rest.to_string()),
        "summarize" | "summary" => Command::Summarize,
        "keypoints" | "key-points" => Command::KeyPoints,
        "search" => Command::Search(rest.to_string()),
        "preview" => Command::Preview(required_id(word, rest)?),
        "more" => Command::More(required_id(word, rest)?),
        "less" => Command::Less(required_id(word, rest)?),
        "rm" | "delete" => Command::Remove(required_id(word, rest)?),
        "download" => {
            let mut parts = rest.split_whitespace();
            let Some(id) = parts.next() else {
                bail!("usage: download <id> [dir]");
            };
            Command::Download {
                id: id.to_string(),
                dir: parts.next().map(PathBuf::from),
            }
        }
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command `{other}`; type `help` for the list"),
    };
    Ok(Some(command))
}

fn required_id(word: &str, rest: &str) -> Result<String> {
    match rest.split_whitespace().next() {
        Some(id) => Ok(id.to_string()),
        None => bail!("usage: {word} <id>"),
    }
}
