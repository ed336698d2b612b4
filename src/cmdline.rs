//! Turns one input line into a [`CommandLine`]: pipeline stages, optional
//! redirections, and the background flag. No expansion of any kind.

/// A parsed input line.
///
/// When `error` is set, `stages` is empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// One argument vector per pipeline stage; the first word is the program.
    pub stages: Vec<Vec<String>>,
    /// File connected to the first stage's standard input.
    pub input: Option<String>,
    /// File connected to the last stage's standard output (created or truncated).
    pub output: Option<String>,
    pub background: bool,
    pub error: Option<String>,
}

impl CommandLine {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// The command as shown in job listings: stages joined by ` | `.
    pub fn display_text(&self) -> String {
        self.stages
            .iter()
            .map(|stage| stage.join(" "))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Pipe,
    Input,
    Output,
    Background,
}

/// States for the tokenizer state machine.
enum State {
    /// Between tokens: whitespace is skipped
    Normal,
    /// Building an unquoted word: whitespace ends it
    InWord,
    /// Inside double quotes: whitespace is preserved
    InDoubleQuote,
    /// Inside single quotes: everything is literal
    InSingleQuote,
}

fn operator(ch: char) -> Option<Token> {
    match ch {
        '|' => Some(Token::Pipe),
        '<' => Some(Token::Input),
        '>' => Some(Token::Output),
        '&' => Some(Token::Background),
        _ => None,
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            (State::Normal | State::InWord, ' ' | '\t') => {
                if let State::InWord = state {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
                state = State::Normal;
            }
            (State::Normal | State::InWord, '"') => state = State::InDoubleQuote,
            (State::Normal | State::InWord, '\'') => state = State::InSingleQuote,
            (State::Normal | State::InWord, '\\') => {
                word.push(chars.next().unwrap_or('\\'));
                state = State::InWord;
            }
            (State::Normal | State::InWord, c) => match operator(c) {
                Some(op) => {
                    if let State::InWord = state {
                        tokens.push(Token::Word(std::mem::take(&mut word)));
                    }
                    tokens.push(op);
                    state = State::Normal;
                }
                None => {
                    word.push(c);
                    state = State::InWord;
                }
            },

            (State::InDoubleQuote, '"') => state = State::InWord,
            (State::InDoubleQuote, '\\') => match chars.peek() {
                Some(&(next @ ('"' | '\\' | '$' | '`'))) => {
                    word.push(next);
                    chars.next();
                }
                _ => word.push('\\'),
            },
            (State::InDoubleQuote, c) => word.push(c),

            (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InSingleQuote, c) => word.push(c),
        }
    }

    match state {
        State::InWord => tokens.push(Token::Word(word)),
        State::InDoubleQuote | State::InSingleQuote => {
            return Err("unterminated quote".to_string());
        }
        State::Normal => {}
    }
    Ok(tokens)
}

/// Parse one input line.
pub fn parse(input: &str) -> CommandLine {
    let tokens = match tokenize(input) {
        Ok(tokens) => tokens,
        Err(message) => return CommandLine::failed(message),
    };
    if tokens.is_empty() {
        return CommandLine::default();
    }

    let mut line = CommandLine::default();
    let mut stage: Vec<String> = Vec::new();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => stage.push(word),
            Token::Pipe => {
                if stage.is_empty() {
                    return CommandLine::failed("misplaced pipe");
                }
                line.stages.push(std::mem::take(&mut stage));
            }
            Token::Input | Token::Output => {
                let is_input = token == Token::Input;
                let path = match tokens.next() {
                    Some(Token::Word(path)) => path,
                    _ => {
                        let op = if is_input { '<' } else { '>' };
                        return CommandLine::failed(format!("filename expected after '{op}'"));
                    }
                };
                let slot = if is_input {
                    &mut line.input
                } else {
                    &mut line.output
                };
                if slot.replace(path).is_some() {
                    let what = if is_input { "input" } else { "output" };
                    return CommandLine::failed(format!("only one {what} file supported"));
                }
            }
            Token::Background => {
                if tokens.peek().is_some() {
                    return CommandLine::failed("'&' must end the command");
                }
                line.background = true;
            }
        }
    }

    if stage.is_empty() {
        return CommandLine::failed(if line.stages.is_empty() {
            "missing command"
        } else {
            "misplaced pipe"
        });
    }
    line.stages.push(stage);
    line
}
