use crate::{
    error::{Error, Result},
    script::Verb,
};

use super::{VerbOutput, arg, opt_arg};

/// Expressions longer than this are rejected outright.
const MAX_EXPRESSION_LEN: usize = 256;

pub fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::MathEval => format_number(eval(arg(args, 0, verb)?)?),
        Verb::MathRound => {
            let value: f64 = parse_f64(arg(args, 0, verb)?)?;
            let digits: u32 = opt_arg(args, 1)
                .map(|v| {
                    v.parse()
                        .map_err(|_| Error::message(format!("bad digit count {v:?}")))
                })
                .transpose()?
                .unwrap_or(0);
            let factor = 10f64.powi(digits as i32);
            format_number((value * factor).round() / factor)
        },
        Verb::MathSum => {
            let mut total = 0f64;
            for value in args {
                total += parse_f64(value)?;
            }
            format_number(total)
        },
        other => return Err(Error::message(format!("{other} is not a math verb"))),
    };
    Ok(VerbOutput::text(out))
}

fn parse_f64(value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::message(format!("{value:?} is not a number")))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate an arithmetic expression over `+ - * / % ( )` and decimal
/// numbers. Nothing else — no names, no calls, no bitwise anything.
pub fn eval(expression: &str) -> Result<f64> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(Error::message(format!(
            "expression longer than {MAX_EXPRESSION_LEN} chars"
        )));
    }
    let mut parser = Parser {
        bytes: expression.as_bytes(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(Error::message(format!(
            "unexpected character at offset {}",
            parser.pos
        )));
    }
    Ok(value)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.bytes.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value += self.term()?;
                },
                Some(b'-') => {
                    self.pos += 1;
                    value -= self.term()?;
                },
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value *= self.factor()?;
                },
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(Error::message("division by zero"));
                    }
                    value /= divisor;
                },
                Some(b'%') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(Error::message("modulo by zero"));
                    }
                    value %= divisor;
                },
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            },
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(Error::message("missing closing parenthesis"));
                }
                self.pos += 1;
                Ok(value)
            },
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(Error::message(format!(
                "unexpected character {:?}",
                c as char
            ))),
            None => Err(Error::message("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(&c) = self.bytes.get(self.pos) {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == b'.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| Error::message("invalid number"))?;
        raw.parse()
            .map_err(|_| Error::message(format!("invalid number {raw:?}")))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn a(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn text(verb: Verb, args: &[&str]) -> String {
        run(verb, &a(args)).unwrap().stdout
    }

    #[rstest]
    #[case("1+2", "3")]
    #[case("2*3+4", "10")]
    #[case("2*(3+4)", "14")]
    #[case("10/4", "2.5")]
    #[case("10%3", "1")]
    #[case("-5+2", "-3")]
    #[case("1.5*2", "3")]
    #[case(" 7 - 2 * 2 ", "3")]
    #[case("((1+2))*3", "9")]
    fn test_eval(#[case] expression: &str, #[case] expected: &str) {
        assert_eq!(text(Verb::MathEval, &[expression]), expected);
    }

    #[rstest]
    #[case("1+")]
    #[case("(1+2")]
    #[case("1/0")]
    #[case("2**3")]
    #[case("pow(2,3)")]
    #[case("0x10")]
    #[case("1 & 2")]
    fn test_eval_rejects(#[case] expression: &str) {
        assert!(run(Verb::MathEval, &a(&[expression])).is_err());
    }

    #[test]
    fn test_eval_length_cap() {
        let long = "1+".repeat(129) + "1";
        assert!(run(Verb::MathEval, &a(&[&long])).is_err());
    }

    #[test]
    fn test_round_and_sum() {
        assert_eq!(text(Verb::MathRound, &["3.14159", "2"]), "3.14");
        assert_eq!(text(Verb::MathRound, &["2.7"]), "3");
        assert_eq!(text(Verb::MathSum, &["1", "2.5", "-0.5"]), "3");
    }
}
