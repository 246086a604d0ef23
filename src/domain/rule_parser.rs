//! Entry rule DSL parser.
//!
//! The input is split into tokens first, then a recursive descent parser
//! builds the [`Rule`] tree. Every error carries the byte offset of the
//! offending token.

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorType;
use crate::domain::rule::{Operand, Rule};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Word,
    Number,
    LParen,
    RParen,
    Comma,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: Kind,
    text: &'a str,
    pos: usize,
}

impl Token<'_> {
    fn describe(&self) -> String {
        match self.kind {
            Kind::End => "end of input".to_string(),
            _ => format!("'{}'", self.text),
        }
    }
}

fn error(message: impl Into<String>, position: usize) -> ParseError {
    ParseError {
        message: message.into(),
        position,
    }
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'(' => Kind::LParen,
            b')' => Kind::RParen,
            b',' => Kind::Comma,
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: Kind::Word,
                    text: &input[start..i],
                    pos: start,
                });
                continue;
            }
            b'0'..=b'9' | b'.' | b'-' => {
                if c == b'-' {
                    i += 1;
                }
                let mut digits = 0;
                let mut seen_dot = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'0'..=b'9' => digits += 1,
                        b'.' if !seen_dot => seen_dot = true,
                        _ => break,
                    }
                    i += 1;
                }
                if digits == 0 {
                    return Err(error("expected number", start));
                }
                tokens.push(Token {
                    kind: Kind::Number,
                    text: &input[start..i],
                    pos: start,
                });
                continue;
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(error(format!("unexpected character '{}'", ch), start));
            }
        };
        tokens.push(Token {
            kind,
            text: &input[start..start + 1],
            pos: start,
        });
        i += 1;
    }

    tokens.push(Token {
        kind: Kind::End,
        text: "",
        pos: input.len(),
    });
    Ok(tokens)
}

fn comparison(keyword: &str) -> Option<fn(Operand, Operand) -> Rule> {
    let make: fn(Operand, Operand) -> Rule = match keyword {
        "CROSS_ABOVE" => |left, right| Rule::CrossAbove { left, right },
        "CROSS_BELOW" => |left, right| Rule::CrossBelow { left, right },
        "ABOVE" => |left, right| Rule::Above { left, right },
        "BELOW" => |left, right| Rule::Below { left, right },
        "EQUALS" => |left, right| Rule::Equals { left, right },
        _ => return None,
    };
    Some(make)
}

const INDICATORS: [(&str, fn(usize) -> IndicatorType); 6] = [
    ("SMA", IndicatorType::Sma),
    ("STDDEV", IndicatorType::Stddev),
    ("ROC", IndicatorType::Roc),
    ("ATR", IndicatorType::Atr),
    ("HIGHEST", IndicatorType::Highest),
    ("LOWEST", IndicatorType::Lowest),
];

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token<'a>>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Token<'a> {
        self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token<'a> {
        let token = self.peek();
        if token.kind != Kind::End {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: Kind, what: &str) -> Result<Token<'a>, ParseError> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.next())
        } else {
            Err(error(
                format!("expected {}, found {}", what, token.describe()),
                token.pos,
            ))
        }
    }

    fn open(&mut self) -> Result<(), ParseError> {
        self.expect(Kind::LParen, "'('").map(|_| ())
    }

    fn close(&mut self) -> Result<(), ParseError> {
        self.expect(Kind::RParen, "')'").map(|_| ())
    }

    fn comma(&mut self) -> Result<(), ParseError> {
        self.expect(Kind::Comma, "','").map(|_| ())
    }

    fn number(&mut self) -> Result<f64, ParseError> {
        let token = self.expect(Kind::Number, "number")?;
        token
            .text
            .parse::<f64>()
            .map_err(|_| error(format!("invalid number: {}", token.text), token.pos))
    }

    /// A whole number of at least 1; `what` names it in the error.
    fn positive_integer(&mut self, what: &str) -> Result<usize, ParseError> {
        let token = self.expect(Kind::Number, "integer")?;
        let value = token
            .text
            .parse::<usize>()
            .map_err(|_| error(format!("expected integer, found '{}'", token.text), token.pos))?;
        if value == 0 {
            return Err(error(format!("{} must be at least 1", what), token.pos));
        }
        Ok(value)
    }

    fn operand(&mut self) -> Result<Operand, ParseError> {
        let token = self.peek();
        match token.kind {
            Kind::Number => Ok(Operand::Constant(self.number()?)),
            Kind::Word => {
                let field = match token.text {
                    "open" => Some(Operand::Open),
                    "high" => Some(Operand::High),
                    "low" => Some(Operand::Low),
                    "close" => Some(Operand::Close),
                    "volume" => Some(Operand::Volume),
                    _ => None,
                };
                if let Some(field) = field {
                    self.next();
                    return Ok(field);
                }
                let (_, make) = INDICATORS
                    .iter()
                    .find(|(name, _)| *name == token.text)
                    .ok_or_else(|| {
                        error(
                            format!("expected indicator, found '{}'", token.text),
                            token.pos,
                        )
                    })?;
                self.next();
                self.open()?;
                let period = self.positive_integer("indicator period")?;
                self.close()?;
                Ok(Operand::Indicator(make(period)))
            }
            _ => Err(error(
                format!("expected operand, found {}", token.describe()),
                token.pos,
            )),
        }
    }

    /// At least two comma-separated rules up to the closing parenthesis.
    fn rule_list(&mut self, keyword: &str) -> Result<Vec<Rule>, ParseError> {
        let mut rules = vec![self.rule()?];
        while self.peek().kind == Kind::Comma {
            self.next();
            rules.push(self.rule()?);
        }
        let end = self.peek();
        self.close()?;
        if rules.len() < 2 {
            return Err(error(
                format!("{} requires at least 2 rules", keyword),
                end.pos,
            ));
        }
        Ok(rules)
    }

    /// `(rule, count)` shared by CONSECUTIVE and ANY_OF.
    fn rule_with_count(&mut self) -> Result<(Box<Rule>, usize), ParseError> {
        let rule = self.rule()?;
        self.comma()?;
        let count = self.positive_integer("bar count")?;
        self.close()?;
        Ok((Box::new(rule), count))
    }

    fn rule(&mut self) -> Result<Rule, ParseError> {
        let token = self.peek();
        if token.kind != Kind::Word {
            return Err(error(
                format!("expected rule, found {}", token.describe()),
                token.pos,
            ));
        }
        let keyword = token.text;

        if let Some(make) = comparison(keyword) {
            self.next();
            self.open()?;
            let left = self.operand()?;
            self.comma()?;
            let right = self.operand()?;
            self.close()?;
            return Ok(make(left, right));
        }

        let rule = match keyword {
            "BETWEEN" => {
                self.next();
                self.open()?;
                let operand = self.operand()?;
                self.comma()?;
                let lower = self.number()?;
                self.comma()?;
                let upper = self.number()?;
                self.close()?;
                Rule::Between {
                    operand,
                    lower,
                    upper,
                }
            }
            "AND" | "OR" => {
                self.next();
                self.open()?;
                let rules = self.rule_list(keyword)?;
                if keyword == "AND" {
                    Rule::And(rules)
                } else {
                    Rule::Or(rules)
                }
            }
            "NOT" => {
                self.next();
                self.open()?;
                let inner = self.rule()?;
                self.close()?;
                Rule::Not(Box::new(inner))
            }
            "CONSECUTIVE" => {
                self.next();
                self.open()?;
                let (rule, count) = self.rule_with_count()?;
                Rule::Consecutive { rule, count }
            }
            "ANY_OF" => {
                self.next();
                self.open()?;
                let (rule, count) = self.rule_with_count()?;
                Rule::AnyOf { rule, count }
            }
            _ => {
                return Err(error(
                    format!("expected rule, found '{}'", keyword),
                    token.pos,
                ))
            }
        };
        Ok(rule)
    }
}

/// Parse a complete rule; trailing input is an error.
pub fn parse(input: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser {
        input,
        tokens: tokenize(input)?,
        cursor: 0,
    };
    let rule = parser.rule()?;
    let rest = parser.peek();
    if rest.kind != Kind::End {
        return Err(error(
            format!(
                "unexpected input after rule: '{}'",
                parser.input[rest.pos..].trim_end()
            ),
            rest.pos,
        ));
    }
    Ok(rule)
}
