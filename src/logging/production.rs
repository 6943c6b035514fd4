//! Plain text log format for log aggregation.
//!
//! Format: `LEVEL target: message [span1{field=value}][span2{field=value}]`

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Single-line log format with the span context appended, outermost first:
/// ```text
/// DEBUG sansho::query::relational::reader: Fetched 20 of 311 'Order' rows in 4ms [list_orders{tenant=acme}]
/// ```
pub struct ProductionLogFormat;

impl<S, N> FormatEvent<S, N> for ProductionLogFormat
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
        let metadata = event.metadata();
        write!(writer, "{:<5} {}: ", metadata.level(), metadata.target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        let spans: Vec<_> = ctx
            .event_scope()
            .map(|scope| scope.from_root().collect())
            .unwrap_or_default();

        if !spans.is_empty() {
            write!(writer, " ")?;
            for span in spans {
                write!(writer, "[{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>()
                    && !fields.is_empty()
                {
                    write!(writer, "{{{}}}", fields)?;
                }

                write!(writer, "]")?;
            }
        }

        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Collects formatted output in memory.
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .event_format(ProductionLogFormat)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn events_carry_level_target_and_spans() {
        let output = capture(|| {
            let span = tracing::info_span!("list_orders", tenant = "acme");
            let _guard = span.enter();
            tracing::debug!("Dropping unknown sort field '{}'", "nope");
        });

        assert_eq!(
            output,
            "DEBUG sansho::logging::production::tests: Dropping unknown sort field 'nope' \
             [list_orders{tenant=\"acme\"}]\n"
        );
    }

    #[test]
    fn events_outside_spans_have_no_suffix() {
        let output = capture(|| tracing::warn!("Ignoring invalid size"));
        assert_eq!(output, "WARN  sansho::logging::production::tests: Ignoring invalid size\n");
    }
}
