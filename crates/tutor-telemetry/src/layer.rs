use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::sink::{LogEntry, SqliteLogSink};

/// `tracing` layer that persists WARN and ERROR events.
///
/// `session_id` and `learner` are read from the event itself or, failing
/// that, from the nearest enclosing span that recorded them.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

/// Correlation fields stashed in span extensions.
#[derive(Clone, Debug, Default)]
struct Correlation {
    session_id: Option<String>,
    learner: Option<String>,
}

impl Correlation {
    fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.learner.is_none()
    }

    fn fill_from(&mut self, other: &Correlation) {
        if self.session_id.is_none() {
            self.session_id.clone_from(&other.session_id);
        }
        if self.learner.is_none() {
            self.learner.clone_from(&other.learner);
        }
    }

    fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.learner.is_some()
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
    correlation: Correlation,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        let _ = self.fields.insert(field.name().to_string(), value);
    }

    fn put_text(&mut self, field: &Field, text: String) {
        match field.name() {
            "message" => self.message = Some(text),
            "session_id" => self.correlation.session_id = Some(text),
            "learner" => self.correlation.learner = Some(text),
            _ => self.put(field, Value::String(text)),
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        self.put_text(field, text.trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put_text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);
        if collector.correlation.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(collector.correlation);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        if !collector.correlation.is_complete() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    if let Some(found) = span.extensions().get::<Correlation>() {
                        collector.correlation.fill_from(found);
                    }
                    if collector.correlation.is_complete() {
                        break;
                    }
                }
            }
        }

        let fields = (!collector.fields.is_empty())
            .then(|| serde_json::to_string(&collector.fields).ok())
            .flatten();

        self.sink.insert(&LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: collector.message.unwrap_or_default(),
            fields,
            session_id: collector.correlation.session_id,
            learner: collector.correlation.learner,
        });
    }
}
