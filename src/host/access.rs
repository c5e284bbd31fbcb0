//! Access security configuration files.
//!
//! Supports the subset of the access security language the in-memory host
//! needs:
//!
//! ```text
//! UAG(operators) { alice, bob }
//! HAG(consoles) { workstation }
//! ASG(DEFAULT) {
//!     RULE(1, READ)
//!     RULE(1, WRITE, TRAPWRITE) {
//!         UAG(operators)
//!     }
//! }
//! ```
//!
//! Anything after `#` on a line is a comment. Unknown statements inside an
//! `ASG` block (input links, `CALC`) are accepted and ignored.

use crate::types::WriterIdentity;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Access security group every record of the in-memory host belongs to.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Errors loading an access security configuration.
#[derive(Error, Debug)]
pub enum AccessError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The text is not a valid configuration.
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Access level granted by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No access.
    None,
    /// Read only.
    Read,
    /// Read and write.
    Write,
    /// Read, write and remote procedure calls.
    Rpc,
}

/// One `RULE` of an access security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    /// Access security level the rule applies to.
    pub level: u32,
    /// Granted access.
    pub access: Access,
    /// Whether writes granted by this rule are trapped.
    pub trap_write: bool,
    /// User access groups the rule is limited to.
    pub user_groups: Vec<String>,
    /// Host access groups the rule is limited to.
    pub host_groups: Vec<String>,
}

/// An `ASG` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGroup {
    /// Group name.
    pub name: String,
    /// Rules in file order.
    pub rules: Vec<AccessRule>,
}

/// A parsed access security configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessConfig {
    /// `UAG` name to member users.
    pub user_groups: BTreeMap<String, Vec<String>>,
    /// `HAG` name to member hosts.
    pub host_groups: BTreeMap<String, Vec<String>>,
    /// `ASG` blocks in file order.
    pub groups: Vec<AccessGroup>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Open,
    Close,
    BlockOpen,
    BlockClose,
    Comma,
}

#[derive(Debug)]
struct Node {
    keyword: String,
    args: Vec<String>,
    members: Vec<String>,
    children: Vec<Node>,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let mut chars = line.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                '(' => tokens.push(Token::Open),
                ')' => tokens.push(Token::Close),
                '{' => tokens.push(Token::BlockOpen),
                '}' => tokens.push(Token::BlockClose),
                ',' => tokens.push(Token::Comma),
                '"' => {
                    chars.next();
                    let mut word = String::new();
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some(ch) => word.push(ch),
                            None => return Err(format!("line {}: unterminated string", line_no + 1)),
                        }
                    }
                    tokens.push(Token::Word(word));
                    continue;
                }
                c if c.is_whitespace() => {}
                _ => {
                    let mut word = String::new();
                    while let Some(&ch) = chars.peek() {
                        if ch.is_alphanumeric() || "_-.:;[]<>+".contains(ch) {
                            word.push(ch);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if word.is_empty() {
                        return Err(format!("line {}: unexpected character {:?}", line_no + 1, c));
                    }
                    tokens.push(Token::Word(word));
                    continue;
                }
            }
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(format!("expected {:?}, found {:?}", expected, other)),
        }
    }

    fn args(&mut self) -> Result<Vec<String>, String> {
        self.expect(Token::Open)?;
        let mut args = Vec::new();
        loop {
            match self.next() {
                Some(Token::Word(word)) => args.push(word),
                Some(Token::Comma) => {}
                Some(Token::Close) => return Ok(args),
                other => return Err(format!("unexpected {:?} in argument list", other)),
            }
        }
    }

    fn node(&mut self, keyword: String) -> Result<Node, String> {
        let args = self.args()?;
        let mut node = Node { keyword, args, members: Vec::new(), children: Vec::new() };
        if self.peek() == Some(&Token::BlockOpen) {
            self.next();
            self.block(&mut node)?;
        }
        Ok(node)
    }

    fn block(&mut self, node: &mut Node) -> Result<(), String> {
        loop {
            match self.next() {
                Some(Token::BlockClose) => return Ok(()),
                Some(Token::Comma) => {}
                Some(Token::Word(word)) => {
                    if self.peek() == Some(&Token::Open) {
                        let child = self.node(word)?;
                        node.children.push(child);
                    } else {
                        node.members.push(word);
                    }
                }
                other => return Err(format!("unexpected {:?} in {} block", other, node.keyword)),
            }
        }
    }

    fn top_level(&mut self) -> Result<Vec<Node>, String> {
        let mut nodes = Vec::new();
        while let Some(token) = self.next() {
            match token {
                Token::Word(keyword) => nodes.push(self.node(keyword)?),
                other => return Err(format!("unexpected {:?} at top level", other)),
            }
        }
        Ok(nodes)
    }
}

fn parse_rule(node: &Node) -> Result<AccessRule, String> {
    let level = node
        .args
        .first()
        .ok_or("RULE without level")?
        .parse::<u32>()
        .map_err(|e| format!("bad RULE level: {}", e))?;
    let access = match node.args.get(1).map(String::as_str) {
        Some("NONE") => Access::None,
        Some("READ") => Access::Read,
        Some("WRITE") => Access::Write,
        Some("RPC") => Access::Rpc,
        other => return Err(format!("bad RULE access: {:?}", other)),
    };
    let trap_write = match node.args.get(2).map(String::as_str) {
        None | Some("NOTRAPWRITE") => false,
        Some("TRAPWRITE") => true,
        Some(other) => return Err(format!("bad RULE option: {}", other)),
    };

    let mut rule = AccessRule {
        level,
        access,
        trap_write,
        user_groups: Vec::new(),
        host_groups: Vec::new(),
    };
    for child in &node.children {
        match child.keyword.as_str() {
            "UAG" => rule.user_groups.extend(child.args.iter().cloned()),
            "HAG" => rule.host_groups.extend(child.args.iter().cloned()),
            _ => {}
        }
    }
    Ok(rule)
}

impl AccessConfig {
    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self, AccessError> {
        Self::parse_nodes(text).map_err(AccessError::Syntax)
    }

    fn parse_nodes(text: &str) -> Result<Self, String> {
        let tokens = tokenize(text)?;
        let nodes = Parser { tokens, pos: 0 }.top_level()?;

        let mut config = AccessConfig::default();
        for node in nodes {
            let name = node
                .args
                .first()
                .cloned()
                .ok_or_else(|| format!("{} without a name", node.keyword))?;
            match node.keyword.as_str() {
                "UAG" => {
                    config.user_groups.insert(name, node.members);
                }
                "HAG" => {
                    config.host_groups.insert(name, node.members);
                }
                "ASG" => {
                    let rules = node
                        .children
                        .iter()
                        .filter(|child| child.keyword == "RULE")
                        .map(parse_rule)
                        .collect::<Result<Vec<_>, _>>()?;
                    config.groups.push(AccessGroup { name, rules });
                }
                other => return Err(format!("unknown statement {}", other)),
            }
        }
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, AccessError> {
        let text = std::fs::read_to_string(path).map_err(|source| AccessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// True if a write by `writer` to a record in group `asg` is trapped.
    ///
    /// A record whose group is not defined falls back to `DEFAULT`. A rule
    /// limited to `UAG`/`HAG` lists applies only to writers that are members
    /// of one of them; a rule with no lists applies to everyone.
    pub fn traps_write_by(&self, asg: &str, writer: &WriterIdentity) -> bool {
        let Some(group) = self.group(asg).or_else(|| self.group(DEFAULT_GROUP)) else {
            return false;
        };
        group.rules.iter().any(|rule| {
            rule.trap_write
                && matches!(rule.access, Access::Write | Access::Rpc)
                && Self::member_of(&self.user_groups, &rule.user_groups, &writer.user)
                && Self::member_of(&self.host_groups, &rule.host_groups, &writer.host)
        })
    }

    fn member_of(defined: &BTreeMap<String, Vec<String>>, allowed: &[String], who: &str) -> bool {
        allowed.is_empty()
            || allowed
                .iter()
                .filter_map(|name| defined.get(name))
                .any(|members| members.iter().any(|m| m == who))
    }

    /// True if any rule traps the writes it grants.
    pub fn traps_writes(&self) -> bool {
        self.groups
            .iter()
            .flat_map(|g| g.rules.iter())
            .any(|r| r.trap_write && matches!(r.access, Access::Write | Access::Rpc))
    }

    /// Looks up an access security group.
    pub fn group(&self, name: &str) -> Option<&AccessGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        # operators may write, every write is logged
        UAG(operators) { alice, bob }
        HAG(consoles) { workstation }
        ASG(DEFAULT) {
            INPA("$(P):MODE")
            RULE(1, READ)
            RULE(1, WRITE, TRAPWRITE) {
                UAG(operators)
                HAG(consoles)
            }
        }
    "#;

    #[test]
    fn test_parse_sample() {
        let config = AccessConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.user_groups["operators"], vec!["alice", "bob"]);
        assert_eq!(config.host_groups["consoles"], vec!["workstation"]);

        let asg = config.group("DEFAULT").unwrap();
        assert_eq!(asg.rules.len(), 2);
        assert_eq!(asg.rules[0].access, Access::Read);
        assert!(asg.rules[1].trap_write);
        assert_eq!(asg.rules[1].user_groups, vec!["operators"]);
        assert!(config.traps_writes());
    }

    #[test]
    fn test_no_trap() {
        let config = AccessConfig::parse("ASG(DEFAULT) { RULE(1, WRITE) }").unwrap();
        assert!(!config.traps_writes());

        let config = AccessConfig::parse("ASG(DEFAULT) { RULE(1, READ, TRAPWRITE) }").unwrap();
        assert!(!config.traps_writes());
    }

    #[test]
    fn test_parse_errors() {
        assert!(AccessConfig::parse("ASG(DEFAULT) { RULE(1, WRITE) ").is_err());
        assert!(AccessConfig::parse("ASG(DEFAULT) { RULE(x, WRITE) }").is_err());
        assert!(AccessConfig::parse("ASG(DEFAULT) { RULE(1, SMASH) }").is_err());
        assert!(AccessConfig::parse("BOGUS(x)").is_err());
        assert!(AccessConfig::parse("ASG(\"open").is_err());
    }

    #[test]
    fn test_trap_limited_to_groups() {
        let config = AccessConfig::parse(SAMPLE).unwrap();
        let alice = WriterIdentity::new("alice", "workstation");
        assert!(config.traps_write_by(DEFAULT_GROUP, &alice));
        assert!(config.traps_write_by("UNDEFINED", &alice));
        assert!(!config.traps_write_by(DEFAULT_GROUP, &WriterIdentity::new("mallory", "workstation")));
        assert!(!config.traps_write_by(DEFAULT_GROUP, &WriterIdentity::new("alice", "elsewhere")));

        let open = AccessConfig::parse("ASG(DEFAULT) { RULE(1, WRITE, TRAPWRITE) }").unwrap();
        assert!(open.traps_write_by(DEFAULT_GROUP, &WriterIdentity::new("anyone", "anywhere")));

        let unknown_uag = AccessConfig::parse("ASG(DEFAULT) { RULE(1, WRITE, TRAPWRITE) { UAG(ghosts) } }").unwrap();
        assert!(!unknown_uag.traps_write_by(DEFAULT_GROUP, &alice));

        let other_asg = AccessConfig::parse("ASG(SPECIAL) { RULE(1, WRITE, TRAPWRITE) }").unwrap();
        assert!(!other_asg.traps_write_by(DEFAULT_GROUP, &alice));
    }

    #[test]
    fn test_typed_errors() {
        assert!(matches!(AccessConfig::parse("BOGUS(x)"), Err(AccessError::Syntax(_))));
        let err = AccessConfig::from_file(Path::new("/nonexistent/access.acf")).unwrap_err();
        assert!(matches!(err, AccessError::Read { .. }));
        assert!(err.to_string().starts_with("cannot read /nonexistent/access.acf"));
    }

    #[test]
    fn test_empty_file() {
        let config = AccessConfig::parse("# nothing here\n").unwrap();
        assert!(config.groups.is_empty());
        assert!(!config.traps_writes());
    }
}
