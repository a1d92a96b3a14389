use crate::{
    error::{Error, Result},
    script::{Verb, compiler::build_regex},
};

use super::{VerbOutput, arg, opt_arg};

/// Regex subjects are capped so bounded patterns stay bounded work.
const MAX_REGEX_SUBJECT: usize = 1 << 20;

pub fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::TextReplace => {
            let input = arg(args, 0, verb)?;
            let find = arg(args, 1, verb)?;
            let replace = arg(args, 2, verb)?;
            if find.is_empty() {
                return Err(Error::message("TextReplace needs a non-empty find string"));
            }
            input.replace(find, replace)
        },
        Verb::TextMatch => {
            let input = bounded(arg(args, 0, verb)?)?;
            let re = build_regex(arg(args, 1, verb)?)?;
            re.find_iter(input)
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        },
        Verb::TextRegexReplace => {
            let input = bounded(arg(args, 0, verb)?)?;
            let re = build_regex(arg(args, 1, verb)?)?;
            let replacement = arg(args, 2, verb)?;
            re.replace_all(input, replacement).into_owned()
        },
        Verb::TextSplit => {
            let input = arg(args, 0, verb)?;
            let separator = arg(args, 1, verb)?;
            if separator.is_empty() {
                return Err(Error::message("TextSplit needs a non-empty separator"));
            }
            input.split(separator).collect::<Vec<_>>().join("\n")
        },
        Verb::TextJoin => {
            let separator = arg(args, 0, verb)?;
            args[1..].join(separator)
        },
        Verb::TextTrim => arg(args, 0, verb)?.trim().to_string(),
        Verb::TextUpper => arg(args, 0, verb)?.to_uppercase(),
        Verb::TextLower => arg(args, 0, verb)?.to_lowercase(),
        Verb::TextContains => arg(args, 0, verb)?
            .contains(arg(args, 1, verb)?)
            .to_string(),
        Verb::TextLineCount => arg(args, 0, verb)?.lines().count().to_string(),
        Verb::TextSelectLines => {
            let input = arg(args, 0, verb)?;
            let start: usize = parse(arg(args, 1, verb)?)?;
            let end: usize = parse(arg(args, 2, verb)?)?;
            if start == 0 || end < start {
                return Err(Error::message("line range must be 1-based and ordered"));
            }
            input
                .lines()
                .skip(start - 1)
                .take(end - start + 1)
                .collect::<Vec<_>>()
                .join("\n")
        },
        Verb::TextSort => {
            let mut lines: Vec<&str> = arg(args, 0, verb)?.lines().collect();
            lines.sort_unstable();
            lines.join("\n")
        },
        Verb::TextUniq => {
            let mut out: Vec<&str> = Vec::new();
            for line in arg(args, 0, verb)?.lines() {
                if out.last() != Some(&line) {
                    out.push(line);
                }
            }
            out.join("\n")
        },
        Verb::TextLength => arg(args, 0, verb)?.chars().count().to_string(),
        Verb::TextSubstring => {
            let input = arg(args, 0, verb)?;
            let start: usize = parse(arg(args, 1, verb)?)?;
            let len: usize = opt_arg(args, 2).map(parse).transpose()?.unwrap_or(usize::MAX);
            input.chars().skip(start).take(len).collect()
        },
        Verb::TextStartsWith => arg(args, 0, verb)?
            .starts_with(arg(args, 1, verb)?)
            .to_string(),
        Verb::TextEndsWith => arg(args, 0, verb)?
            .ends_with(arg(args, 1, verb)?)
            .to_string(),
        Verb::TextReverse => arg(args, 0, verb)?.chars().rev().collect(),
        other => return Err(Error::message(format!("{other} is not a text verb"))),
    };
    Ok(VerbOutput::text(out))
}

fn bounded(input: &str) -> Result<&str> {
    if input.len() > MAX_REGEX_SUBJECT {
        return Err(Error::message("regex subject larger than 1 MiB"));
    }
    Ok(input)
}

fn parse(value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| Error::message(format!("{value:?} is not a number")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn a(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn text(verb: Verb, args: &[&str]) -> String {
        run(verb, &a(args)).unwrap().stdout
    }

    #[test]
    fn test_replace_split_join() {
        assert_eq!(text(Verb::TextReplace, &["a-b-c", "-", "+"]), "a+b+c");
        assert_eq!(text(Verb::TextSplit, &["a,b,c", ","]), "a\nb\nc");
        assert_eq!(text(Verb::TextJoin, &[", ", "x", "y", "z"]), "x, y, z");
    }

    #[test]
    fn test_regex_ops() {
        assert_eq!(
            text(Verb::TextMatch, &["cat hat bat", r"\b\wat\b"]),
            "cat\nhat\nbat"
        );
        assert_eq!(
            text(Verb::TextRegexReplace, &["v1.2.3", r"\d+", "N"]),
            "vN.N.N"
        );
        assert!(run(Verb::TextMatch, &a(&["x", "("])).is_err());
    }

    #[test]
    fn test_case_trim_length() {
        assert_eq!(text(Verb::TextUpper, &["abc"]), "ABC");
        assert_eq!(text(Verb::TextLower, &["ABC"]), "abc");
        assert_eq!(text(Verb::TextTrim, &["  x  "]), "x");
        assert_eq!(text(Verb::TextLength, &["héllo"]), "5");
        assert_eq!(text(Verb::TextReverse, &["abc"]), "cba");
    }

    #[test]
    fn test_predicates() {
        assert_eq!(text(Verb::TextContains, &["haystack", "stack"]), "true");
        assert_eq!(text(Verb::TextStartsWith, &["haystack", "hay"]), "true");
        assert_eq!(text(Verb::TextEndsWith, &["haystack", "hay"]), "false");
    }

    #[test]
    fn test_lines() {
        assert_eq!(text(Verb::TextLineCount, &["a\nb\nc"]), "3");
        assert_eq!(text(Verb::TextSelectLines, &["a\nb\nc\nd", "2", "3"]), "b\nc");
        assert_eq!(text(Verb::TextSort, &["b\na\nc"]), "a\nb\nc");
        assert_eq!(text(Verb::TextUniq, &["a\na\nb\na"]), "a\nb\na");
    }

    #[test]
    fn test_substring() {
        assert_eq!(text(Verb::TextSubstring, &["hello", "1", "3"]), "ell");
        assert_eq!(text(Verb::TextSubstring, &["hello", "2"]), "llo");
    }
}
