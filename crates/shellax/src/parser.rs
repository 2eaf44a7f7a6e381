//! Command line parser
//!
//! Turns one input line into a chain of [`Command`] stages. The grammar is
//! small on purpose: whitespace separated tokens, single and double quotes,
//! `|` between stages, `<`, `>` and `>>` redirects, a trailing `&` for
//! background execution and a trailing `?` for completion requests.
//!
//! Parsing never fails. Malformed input (unterminated quotes, dangling
//! operators) is classified on a best-effort basis.

use std::fmt;

use monch::{ParseError, ParseErrorFailure, ParseResult};
use tracing::{debug, trace};

// ============================================================================
// AST Types
// ============================================================================

/// One pipeline stage, owning the stage that follows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Executable name or path as typed; empty for a blank line
    pub name: String,
    /// Plain arguments in the order they were typed, without `name`
    pub args: Vec<String>,
    pub redirects: Redirects,
    /// The line ended with `&`
    pub background: bool,
    /// The line ended with `?`
    pub auto_complete: bool,
    /// Next stage of the pipeline
    pub next: Option<Box<Command>>,
}

/// The three redirect slots of a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirects {
    /// `<path`
    pub input: Option<String>,
    /// `>path`
    pub truncate: Option<String>,
    /// `>>path`
    pub append: Option<String>,
}

/// Redirect operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// < - input from file
    Input,
    /// > - output to file (truncate)
    Output,
    /// >> - output to file (append)
    Append,
}

impl RedirectOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RedirectOp::Input => "<",
            RedirectOp::Output => ">",
            RedirectOp::Append => ">>",
        }
    }
}

impl Redirects {
    pub fn get(&self, op: RedirectOp) -> Option<&str> {
        match op {
            RedirectOp::Input => self.input.as_deref(),
            RedirectOp::Output => self.truncate.as_deref(),
            RedirectOp::Append => self.append.as_deref(),
        }
    }

    /// Set a slot. A later redirect of the same kind replaces an earlier one.
    pub fn set(&mut self, op: RedirectOp, path: impl Into<String>) {
        let slot = match op {
            RedirectOp::Input => &mut self.input,
            RedirectOp::Output => &mut self.truncate,
            RedirectOp::Append => &mut self.append,
        };
        *slot = Some(path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.truncate.is_none() && self.append.is_none()
    }
}

impl Command {
    /// True for a blank line (or one holding only markers).
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Number of stages in the chain starting at this command.
    pub fn len(&self) -> usize {
        self.stages().count()
    }

    /// Iterate over this stage and every stage piped after it.
    pub fn stages(&self) -> Stages<'_> {
        Stages { next: Some(self) }
    }

    /// Argument vector handed to the process: `name` followed by `args`.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    fn for_each_stage_mut(&mut self, mut f: impl FnMut(&mut Command)) {
        let mut stage = Some(self);
        while let Some(current) = stage {
            f(current);
            stage = current.next.as_deref_mut();
        }
    }
}

impl Drop for Command {
    // Unlink the chain iteratively so long pipelines do not recurse.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut stage) = next {
            next = stage.next.take();
        }
    }
}

/// Iterator over the stages of a chain.
pub struct Stages<'a> {
    next: Option<&'a Command>,
}

impl<'a> Iterator for Stages<'a> {
    type Item = &'a Command;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next.as_deref();
        Some(current)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, stage) in self.stages().enumerate() {
            if depth > 0 {
                writeln!(f, "\tPiped to:")?;
            }
            let argv = stage.argv();
            writeln!(f, "Command: <{}>", stage.name)?;
            writeln!(f, "\tIs Background: {}", yes_no(stage.background))?;
            writeln!(f, "\tNeeds Auto-complete: {}", yes_no(stage.auto_complete))?;
            writeln!(f, "\tRedirects:")?;
            for (slot, op) in [RedirectOp::Input, RedirectOp::Output, RedirectOp::Append]
                .into_iter()
                .enumerate()
            {
                writeln!(f, "\t\t{}: {}", slot, stage.redirects.get(op).unwrap_or("N/A"))?;
            }
            writeln!(f, "\tArguments ({}):", argv.len())?;
            for (i, arg) in argv.iter().enumerate() {
                writeln!(f, "\t\tArg {}: {}", i, arg)?;
            }
        }
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

// ============================================================================
// Parser Implementation
// ============================================================================

/// Parse one input line into the head of a command chain.
pub fn parse(line: &str) -> Command {
    let mut text = trim_blanks(line);

    let auto_complete = match text.strip_suffix('?') {
        Some(rest) => {
            text = trim_blanks(rest);
            true
        }
        None => false,
    };

    let background = match text.strip_suffix('&') {
        Some(rest) => {
            text = trim_blanks(rest);
            true
        }
        None => false,
    };

    let mut command = parse_stages(text);
    command.for_each_stage_mut(|stage| {
        stage.background |= background;
        stage.auto_complete |= auto_complete;
    });
    command
}

/// Tokenize the line once and split it into stages at every unquoted `|`.
fn parse_stages(input: &str) -> Command {
    let mut stages = Vec::new();
    let mut command = Command::default();
    let mut named = false;
    let mut items = tokenize(input).into_iter().map(classify).peekable();

    while let Some(item) = items.next() {
        trace!(?item, "parse.token");
        match item {
            Item::Pipe => {
                stages.push(std::mem::take(&mut command));
                named = false;
            }
            Item::Background => continue,
            Item::Redirect { op, path } => {
                let path = match path {
                    Some(path) => path,
                    None => match items.peek() {
                        Some(Item::Word(_)) => match items.next() {
                            Some(Item::Word(path)) => path,
                            _ => continue,
                        },
                        _ => {
                            debug!(op = op.symbol(), "redirect without a target ignored");
                            continue;
                        }
                    },
                };
                command.redirects.set(op, path);
            }
            Item::Word(word) => {
                if named {
                    command.args.push(word);
                } else {
                    command.name = word;
                    named = true;
                }
            }
        }
    }

    // Link back to front so each stage owns its successor.
    while let Some(mut previous) = stages.pop() {
        previous.next = Some(Box::new(command));
        command = previous;
    }
    command
}

/// A classified token.
#[derive(Debug)]
enum Item {
    /// `|`
    Pipe,
    /// `&` anywhere on the line
    Background,
    /// `<x`, `>x`, `>>x`; `path` is `None` for a bare operator
    Redirect { op: RedirectOp, path: Option<String> },
    Word(String),
}

fn classify(token: Token) -> Item {
    if !token.quoted {
        match token.text.as_str() {
            "|" => return Item::Pipe,
            "&" => return Item::Background,
            _ => {}
        }
    }

    // Operators count only when written outside quotes.
    let bare = &token.text[..token.bare_prefix];
    for op in [RedirectOp::Append, RedirectOp::Output, RedirectOp::Input] {
        if bare.starts_with(op.symbol()) {
            let path = &token.text[op.symbol().len()..];
            let path = (!path.is_empty() || token.quoted).then(|| path.to_string());
            return Item::Redirect { op, path };
        }
    }

    Item::Word(token.text)
}

// ============================================================================
// Tokenizer
// ============================================================================

/// A whitespace delimited token with its quotes removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Token {
    text: String,
    /// Length of the leading part of `text` that was written unquoted
    bare_prefix: usize,
    /// Any part of the token was quoted
    quoted: bool,
}

impl Token {
    fn push_bare(&mut self, text: &str) {
        if !self.quoted {
            self.bare_prefix += text.len();
        }
        self.text.push_str(text);
    }

    fn push_quoted(&mut self, text: &str) {
        self.quoted = true;
        self.text.push_str(text);
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut remaining = skip_whitespace(input);

    while !remaining.is_empty() {
        match parse_token(remaining) {
            Ok((rest, token)) => {
                tokens.push(token);
                remaining = skip_whitespace(rest);
            }
            Err(_) => break,
        }
    }

    tokens
}

/// Parse one token: adjacent quoted and unquoted segments up to whitespace.
fn parse_token(input: &str) -> ParseResult<'_, Token> {
    let mut token = Token::default();
    let mut remaining = input;

    while !remaining.is_empty() && !remaining.starts_with(is_blank) {
        match parse_quoted(remaining) {
            Ok((rest, text)) => {
                token.push_quoted(text);
                remaining = rest;
                continue;
            }
            Err(ParseError::Failure(failure)) => {
                // Unterminated: the quote runs to the end of the line.
                debug!(?failure, "parse.quote");
                token.push_quoted(&remaining[1..]);
                remaining = "";
                break;
            }
            Err(ParseError::Backtrace) => {}
        }

        let (rest, text) = parse_unquoted_text(remaining)?;
        token.push_bare(text);
        remaining = rest;
    }

    if token.text.is_empty() && !token.quoted {
        return Err(ParseError::Backtrace);
    }

    Ok((remaining, token))
}

/// Parse a single- or double-quoted section; the interior is verbatim.
fn parse_quoted(input: &str) -> ParseResult<'_, &str> {
    let quote = match input.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => return Err(ParseError::Backtrace),
    };

    let content = &input[1..];
    match content.find(quote) {
        Some(end) => Ok((&content[end + 1..], &content[..end])),
        None => Err(ParseError::Failure(ParseErrorFailure::new(
            input,
            "Unterminated quote",
        ))),
    }
}

fn parse_unquoted_text(input: &str) -> ParseResult<'_, &str> {
    let end = input
        .find(|c: char| is_blank(c) || c == '\'' || c == '"')
        .unwrap_or(input.len());

    if end == 0 {
        return Err(ParseError::Backtrace);
    }

    Ok((&input[end..], &input[..end]))
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn skip_whitespace(input: &str) -> &str {
    input.trim_start_matches([' ', '\t'])
}

fn trim_blanks(input: &str) -> &str {
    input.trim_matches([' ', '\t'])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_command() {
        let cmd = parse("ls -la  /tmp\tfoo");
        assert_eq!(cmd.len(), 1);
        assert_eq!(cmd.name, "ls");
        assert_eq!(cmd.args, words(&["-la", "/tmp", "foo"]));
        assert!(cmd.redirects.is_empty());
        assert!(!cmd.background);
        assert!(!cmd.auto_complete);
    }

    #[test]
    fn test_argv_starts_with_name() {
        let cmd = parse("grep -n main");
        assert_eq!(cmd.argv(), vec!["grep", "-n", "main"]);
    }

    #[test]
    fn test_pipeline_stages_in_order() {
        let cmd = parse("cat file | grep pattern | sort -r | uniq");
        assert_eq!(cmd.len(), 4);
        let names: Vec<&str> = cmd.stages().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "grep", "sort", "uniq"]);
        assert_eq!(cmd.args, words(&["file"]));
        let sort = cmd.stages().nth(2).unwrap();
        assert_eq!(sort.args, words(&["-r"]));
        assert!(cmd.stages().all(|s| !s.args.iter().any(|a| a == "|")));
    }

    #[test]
    fn test_double_quoted_argument_keeps_spaces() {
        let cmd = parse("echo \"a b\"");
        assert_eq!(cmd.args, words(&["a b"]));
    }

    #[test]
    fn test_single_quoted_argument_is_verbatim() {
        let cmd = parse("echo 'it \"is\" | here'");
        assert_eq!(cmd.len(), 1);
        assert_eq!(cmd.args, words(&["it \"is\" | here"]));
    }

    #[test]
    fn test_adjacent_segments_concatenate() {
        let cmd = parse("echo a\"b c\"d '' x");
        assert_eq!(cmd.args, words(&["ab cd", "", "x"]));
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        let cmd = parse("echo \"never closed | still here");
        assert_eq!(cmd.len(), 1);
        assert_eq!(cmd.args, words(&["never closed | still here"]));
    }

    #[test]
    fn test_quoted_operators_are_arguments() {
        let cmd = parse("echo \"|\" '&' \">x\" '<y'");
        assert_eq!(cmd.len(), 1);
        assert_eq!(cmd.args, words(&["|", "&", ">x", "<y"]));
        assert!(cmd.redirects.is_empty());
    }

    #[test]
    fn test_attached_redirects() {
        let cmd = parse("sort <in.txt >out.txt");
        assert_eq!(cmd.name, "sort");
        assert!(cmd.args.is_empty());
        assert_eq!(cmd.redirects.input.as_deref(), Some("in.txt"));
        assert_eq!(cmd.redirects.truncate.as_deref(), Some("out.txt"));
        assert_eq!(cmd.redirects.append, None);
    }

    #[test]
    fn test_append_redirect() {
        let cmd = parse("echo hi >>log.txt");
        assert_eq!(cmd.args, words(&["hi"]));
        assert_eq!(cmd.redirects.append.as_deref(), Some("log.txt"));
        assert_eq!(cmd.redirects.truncate, None);
    }

    #[test]
    fn test_detached_redirect_takes_next_token() {
        let cmd = parse("echo hello > out.txt");
        assert_eq!(cmd.args, words(&["hello"]));
        assert_eq!(cmd.redirects.truncate.as_deref(), Some("out.txt"));

        let cmd = parse("wc -l < \"my file.txt\"");
        assert_eq!(cmd.redirects.input.as_deref(), Some("my file.txt"));
        assert_eq!(cmd.args, words(&["-l"]));
    }

    #[test]
    fn test_quoted_redirect_path() {
        let cmd = parse("echo x >\"out file\"");
        assert_eq!(cmd.redirects.truncate.as_deref(), Some("out file"));
    }

    #[test]
    fn test_dangling_redirect_is_ignored() {
        let cmd = parse("echo hi >");
        assert_eq!(cmd.args, words(&["hi"]));
        assert!(cmd.redirects.is_empty());

        let cmd = parse("echo hi > | cat");
        assert!(cmd.redirects.is_empty());
        assert_eq!(cmd.len(), 2);
    }

    #[test]
    fn test_redirect_before_name() {
        let cmd = parse("<in.txt sort -u");
        assert_eq!(cmd.name, "sort");
        assert_eq!(cmd.args, words(&["-u"]));
        assert_eq!(cmd.redirects.input.as_deref(), Some("in.txt"));
    }

    #[test]
    fn test_redirects_per_stage() {
        let cmd = parse("cat <in.txt | tr a-z A-Z >>out.txt");
        assert_eq!(cmd.redirects.input.as_deref(), Some("in.txt"));
        assert_eq!(cmd.redirects.append, None);
        let last = cmd.next.as_deref().unwrap();
        assert_eq!(last.args, words(&["a-z", "A-Z"]));
        assert_eq!(last.redirects.append.as_deref(), Some("out.txt"));
        assert_eq!(last.redirects.input, None);
    }

    #[test]
    fn test_background() {
        let cmd = parse("sleep 10 &");
        assert!(cmd.background);
        assert_eq!(cmd.args, words(&["10"]));

        let cmd = parse("sleep 10&");
        assert!(cmd.background);
        assert_eq!(cmd.args, words(&["10"]));
    }

    #[test]
    fn test_background_applies_to_every_stage() {
        let cmd = parse("yes | head -n 1 &");
        assert_eq!(cmd.len(), 2);
        assert!(cmd.stages().all(|s| s.background));
        assert_eq!(cmd.next.as_deref().unwrap().args, words(&["-n", "1"]));
    }

    #[test]
    fn test_inner_ampersand_is_dropped() {
        let cmd = parse("echo a & b");
        assert!(!cmd.background);
        assert_eq!(cmd.args, words(&["a", "b"]));
    }

    #[test]
    fn test_auto_complete_marker_is_stripped() {
        let cmd = parse("  gre?  ");
        assert!(cmd.auto_complete);
        assert_eq!(cmd.name, "gre");
        assert!(cmd.args.is_empty());

        let cmd = parse("ls src/ma?");
        assert!(cmd.auto_complete);
        assert_eq!(cmd.args, words(&["src/ma"]));
    }

    #[test]
    fn test_empty_line() {
        for line in ["", "   ", "\t \t"] {
            let cmd = parse(line);
            assert!(cmd.is_empty());
            assert!(cmd.args.is_empty());
            assert!(cmd.redirects.is_empty());
            assert!(!cmd.background);
            assert!(cmd.next.is_none());
        }
    }

    #[test]
    fn test_only_ampersand() {
        for line in ["&", "  & "] {
            let cmd = parse(line);
            assert!(cmd.is_empty());
            assert!(cmd.background);
            assert!(cmd.args.is_empty());
        }
    }

    #[test]
    fn test_dangling_pipe_links_empty_stage() {
        let cmd = parse("ls |");
        assert_eq!(cmd.len(), 2);
        assert!(cmd.next.as_deref().unwrap().is_empty());
    }

    #[test]
    fn test_display_matches_dump_layout() {
        let cmd = parse("cat <in.txt | wc -l");
        let dump = cmd.to_string();
        assert!(dump.starts_with("Command: <cat>\n"));
        assert!(dump.contains("\t\t0: in.txt\n"));
        assert!(dump.contains("\t\t1: N/A\n"));
        assert!(dump.contains("\tPiped to:\nCommand: <wc>\n"));
        assert!(dump.contains("\tArguments (2):\n\t\tArg 0: wc\n\t\tArg 1: -l\n"));
    }

    #[test]
    fn test_long_chain_drops_without_recursion() {
        let mut head = Command::default();
        for i in 0..200_000 {
            let mut stage = Command::default();
            stage.name = format!("stage{}", i);
            stage.next = Some(Box::new(head));
            head = stage;
        }
        assert_eq!(head.len(), 200_001);
        drop(head);
    }

    #[test]
    fn test_tokenize_marks_quoted_segments() {
        let tokens = tokenize("ab  'c d'\t>\"e\"");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "c d", ">e"]);
        assert!(!tokens[0].quoted);
        assert!(tokens[1].quoted);
        assert_eq!(tokens[1].bare_prefix, 0);
        assert_eq!(tokens[2].bare_prefix, 1);
    }

    #[test]
    fn test_long_pipeline_parses_in_one_pass() {
        let line = vec!["cat -u"; 50_000].join(" | ");
        let cmd = parse(&line);
        assert_eq!(cmd.len(), 50_000);
        assert!(cmd.stages().all(|s| s.name == "cat" && s.args == words(&["-u"])));
    }
}
