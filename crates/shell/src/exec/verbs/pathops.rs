use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    safety::path::normalize,
    script::Verb,
};

use super::{VerbOutput, arg};

/// Pure string path manipulation. Nothing here touches the filesystem, so
/// no jail resolution applies — the results only become effectful when fed
/// to a filesystem verb, which re-validates.
pub fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::PathJoin => {
            let mut joined = PathBuf::from(arg(args, 0, verb)?);
            for part in &args[1..] {
                joined.push(part);
            }
            joined.to_string_lossy().into_owned()
        },
        Verb::PathParent => Path::new(arg(args, 0, verb)?)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Verb::PathFileName => Path::new(arg(args, 0, verb)?)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Verb::PathExtension => Path::new(arg(args, 0, verb)?)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Verb::PathNormalize => normalize(Path::new(arg(args, 0, verb)?))
            .to_string_lossy()
            .into_owned(),
        Verb::PathIsAbsolute => Path::new(arg(args, 0, verb)?).is_absolute().to_string(),
        other => return Err(Error::message(format!("{other} is not a path verb"))),
    };
    Ok(VerbOutput::text(out))
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
    fn test_join_and_parts() {
        assert_eq!(text(Verb::PathJoin, &["a", "b", "c.txt"]), "a/b/c.txt");
        assert_eq!(text(Verb::PathParent, &["a/b/c.txt"]), "a/b");
        assert_eq!(text(Verb::PathFileName, &["a/b/c.txt"]), "c.txt");
        assert_eq!(text(Verb::PathExtension, &["a/b/c.txt"]), "txt");
        assert_eq!(text(Verb::PathExtension, &["a/b/c"]), "");
    }

    #[test]
    fn test_normalize_and_absolute() {
        assert_eq!(text(Verb::PathNormalize, &["a/./b/../c"]), "a/c");
        assert_eq!(text(Verb::PathIsAbsolute, &["/x/y"]), "true");
        assert_eq!(text(Verb::PathIsAbsolute, &["x/y"]), "false");
    }
}
