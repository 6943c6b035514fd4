//! Colorful console format for development.

use nu_ansi_term::{Color, Style};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Dimmed local time, colored level, one `|` per enclosing span, then
/// target and message. New spans are printed as `=> target: name{fields}`.
pub struct PrettyLogFormat;

macro_rules! styled {
    ($writer:expr, $style:expr, $block:block) => {
        let style = $style;
        write!($writer, "{}", style.prefix())?;
        $block;
        write!($writer, "{}", style.suffix())?;
    };
}

impl PrettyLogFormat {
    fn level_style(level: &Level) -> Style {
        match *level {
            Level::TRACE => Style::new().fg(Color::Purple),
            Level::DEBUG => Style::new().fg(Color::Blue),
            Level::INFO => Style::new().fg(Color::Green),
            Level::WARN => Style::new().fg(Color::Yellow),
            Level::ERROR => Style::new().fg(Color::Red),
        }
    }

    fn format_prefix(writer: &mut Writer, event: &Event<'_>, nesting: usize) -> std::fmt::Result {
        styled!(writer, Style::new().dimmed(), {
            write!(writer, "{} ", chrono::offset::Local::now().format("%T%.3f"))?;
        });

        styled!(writer, Self::level_style(event.metadata().level()), {
            write!(writer, "{:<5}", event.metadata().level())?;
        });

        if nesting > 0 {
            styled!(writer, Style::new().fg(Color::Magenta), {
                write!(writer, " {}", "|".repeat(nesting))?;
            });
        }

        write!(writer, " ")
    }

    fn format_target(writer: &mut Writer, event: &Event<'_>) -> std::fmt::Result {
        styled!(writer, Style::new().dimmed(), {
            write!(writer, "{}: ", event.metadata().target())?;
        });

        Ok(())
    }

    fn format_new_span<S, N>(
        writer: &mut Writer,
        ctx: &FmtContext<'_, S, N>,
        event: &Event<'_>,
    ) -> std::fmt::Result
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let Some(span) = ctx.event_scope().and_then(|mut scope| scope.next()) else {
            Self::format_target(writer, event)?;
            return write!(writer, "new");
        };

        styled!(writer, Style::new().fg(Color::Magenta), {
            write!(writer, "=> ")?;
        });
        Self::format_target(writer, event)?;
        write!(writer, "{}", span.name())?;

        let ext = span.extensions();
        if let Some(fields) = ext.get::<FormattedFields<N>>()
            && !fields.is_empty()
        {
            write!(writer, "{{{}}}", fields)?;
        }

        Ok(())
    }
}

impl<S, N> FormatEvent<S, N> for PrettyLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let nesting = ctx.event_scope().map(|scope| scope.count()).unwrap_or(0);
        Self::format_prefix(&mut writer, event, nesting)?;

        let mut fields = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut fields), event)?;

        if event.metadata().is_span() && fields == "new" {
            Self::format_new_span(&mut writer, ctx, event)?;
        } else {
            Self::format_target(&mut writer, event)?;
            write!(writer, "{}", fields)?;
        }

        writeln!(writer)
    }
}
