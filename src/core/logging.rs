use std::str::FromStr;

use console::Style;
use log::{Level, LevelFilter};

use crate::types::config::{colors_enabled, config};

fn level_style(level: Level) -> Style {
    match level {
        Level::Error => Style::new().red().bold(),
        Level::Warn => Style::new().yellow(),
        Level::Info => Style::new().green(),
        Level::Debug => Style::new().blue(),
        Level::Trace => Style::new().dim(),
    }
}

/// Install the global logger. Info lines are printed bare since they double as user output.
pub fn init_logging() {
    let level = LevelFilter::from_str(config().log().level()).unwrap_or(LevelFilter::Info);
    let colored = colors_enabled();

    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            if record.level() == Level::Info {
                out.finish(format_args!("{message}"));
                return;
            }
            let tag = format!("[{}]", record.level());
            let tag = if colored {
                level_style(record.level()).apply_to(tag).force_styling(true).to_string()
            } else {
                tag
            };
            out.finish(format_args!("{tag} {message}"))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();

    if let Err(e) = result {
        eprintln!("Logger already initialized: {e}");
    }
}
