use std::ffi::OsString;

/// Rewrites single dash long flags (`-csv path`, `-csv=path`) into the double
/// dash form clap expects.
///
/// Only names listed in `long_flags` are touched, so short flags and values
/// that happen to start with a dash pass through unchanged. Everything after a
/// bare `--` is left alone.
pub fn normalize_go_style_flags<I, T>(args: I, long_flags: &[&str]) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut passthrough = false;

    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if passthrough {
                return arg;
            }

            let Some(s) = arg.to_str() else {
                return arg;
            };
            if s == "--" {
                passthrough = true;
                return arg;
            }

            match s.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
                    match long_flags.contains(&name) {
                        true => OsString::from(format!("-{s}")),
                        false => arg,
                    }
                }
                _ => arg,
            }
        })
        .collect()
}
