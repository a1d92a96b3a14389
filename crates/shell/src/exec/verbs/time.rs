use chrono::{DateTime, Duration, Local, Utc};

use crate::{
    error::{Error, Result},
    script::Verb,
};

use super::{VerbOutput, arg, opt_arg};

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| Error::message(format!("timestamp {raw:?} out of range")));
    }
    Err(Error::message(format!(
        "cannot parse {raw:?} as RFC 3339 or unix seconds"
    )))
}

pub fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::TimeNow => Local::now().to_rfc3339(),
        Verb::TimeUtcNow => Utc::now().to_rfc3339(),
        Verb::TimeUnix => Utc::now().timestamp().to_string(),
        Verb::TimeFormat => {
            let at = parse_timestamp(arg(args, 0, verb)?)?;
            let format = opt_arg(args, 1).unwrap_or("%Y-%m-%d %H:%M:%S");
            at.format(format).to_string()
        },
        Verb::TimeParse => parse_timestamp(arg(args, 0, verb)?)?.timestamp().to_string(),
        Verb::TimeAdd => {
            let at = parse_timestamp(arg(args, 0, verb)?)?;
            let seconds: i64 = arg(args, 1, verb)?
                .parse()
                .map_err(|_| Error::message("TimeAdd needs seconds as an integer"))?;
            (at + Duration::seconds(seconds)).to_rfc3339()
        },
        Verb::TimeDiff => {
            let a = parse_timestamp(arg(args, 0, verb)?)?;
            let b = parse_timestamp(arg(args, 1, verb)?)?;
            (b - a).num_seconds().to_string()
        },
        other => return Err(Error::message(format!("{other} is not a time verb"))),
    };
    Ok(VerbOutput::text(out))
}
