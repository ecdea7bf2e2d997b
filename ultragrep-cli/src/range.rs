use clap::Args;
use ultragrep_core::time::{self, day_floor, parse_time_spec, DAY_SECS};
use ultragrep_engine::TimeWindow;

/// Time range options shared by the query commands. All times are UTC.
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Find requests starting at this time (datetime or epoch seconds)
    #[arg(short, long)]
    pub start: Option<String>,
    /// Find requests up to this time
    #[arg(short, long)]
    pub end: Option<String>,
    /// Find requests that happened on this day
    #[arg(short, long, conflicts_with_all = ["hours_back", "days_back"])]
    pub day: Option<String>,
    /// Find requests from COUNT hours ago to now
    #[arg(short = 'o', long, value_name = "COUNT", conflicts_with = "days_back")]
    pub hours_back: Option<u64>,
    /// Find requests from COUNT days ago to now
    #[arg(short = 'b', long, value_name = "COUNT")]
    pub days_back: Option<u64>,
}

impl RangeArgs {
    pub fn window(&self) -> anyhow::Result<TimeWindow> {
        self.window_at(time::now())
    }

    /// Resolves the options against `now`. Without options the range is the
    /// current UTC day.
    pub fn window_at(&self, now: u64) -> anyhow::Result<TimeWindow> {
        let mut start = day_floor(now);
        let mut end = start + DAY_SECS - 1;

        if let Some(day) = &self.day {
            start = day_floor(parse_time_spec(day)?);
            end = start + DAY_SECS - 1;
        }
        if let Some(hours) = self.hours_back {
            start = now.saturating_sub(hours * 3600);
            end = now;
        }
        if let Some(days) = self.days_back {
            start = now.saturating_sub(days * DAY_SECS);
            end = now;
        }
        if let Some(text) = &self.start {
            start = parse_time_spec(text)?;
        }
        if let Some(text) = &self.end {
            end = parse_time_spec(text)?;
        }

        Ok(TimeWindow::new(start, end)?)
    }
}
