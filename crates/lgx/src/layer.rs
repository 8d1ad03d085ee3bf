//! 🪝 The tracing hook: every `info!`/`error!` the application emits becomes a
//! [`LogRecord`] and walks up to the admission door.
//!
//! 🔁 The one rule: never ship our own diagnostics, or those of the HTTP stack that
//! ships them. An `error!` about a failed flush that gets shipped, fails to flush, and
//! logs another `error!` is a feedback loop, and feedback loops are only fun at concerts.

use std::error::Error;
use std::fmt::{self, Write as _};

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::Shipper;
use crate::common::{LogRecord, Severity, render_content};

// -- targets whose events never re-enter the pipeline
const OWN_TARGETS: &[&str] = &["lgx", "reqwest", "hyper", "hyper_util", "h2", "rustls"];

fn is_own_target(target: &str) -> bool {
    OWN_TARGETS.iter().any(|own| {
        target
            .strip_prefix(own)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// 🪝 A `tracing_subscriber` layer that feeds a [`Shipper`].
///
/// Stack it next to whatever else you use for local output:
///
/// ```no_run
/// use tracing_subscriber::prelude::*;
///
/// let shipper = lgx::Shipper::new(lgx::AppConfig::default(), lgx::resolve_host_name());
/// tracing_subscriber::registry()
///     .with(tracing_subscriber::fmt::layer())
///     .with(shipper.layer())
///     .init();
/// shipper.start();
/// ```
///
/// While the shipper is stopped the layer does nothing at all.
#[derive(Debug, Clone)]
pub struct ShippingLayer {
    shipper: Shipper,
}

impl ShippingLayer {
    pub fn new(shipper: Shipper) -> Self {
        Self { shipper }
    }
}

impl<S: Subscriber> Layer<S> for ShippingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.shipper.is_started() {
            return;
        }
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }

        let mut visitor = ContentVisitor::default();
        event.record(&mut visitor);

        let current = std::thread::current();
        let thread_name = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };

        let record = LogRecord::new(
            Utc::now(),
            metadata.target(),
            Severity::from(*metadata.level()),
            thread_name,
            self.shipper.host_name(),
            visitor.finish(),
        );
        let _ = self.shipper.admit(record);
    }
}

/// 📝 Collects an event's fields into one content string.
#[derive(Debug, Default)]
struct ContentVisitor {
    message: String,
    fields: String,
    error_chain: Option<String>,
}

impl ContentVisitor {
    fn finish(self) -> String {
        let mut content = self.message;
        content.push_str(&self.fields);
        if let Some(chain) = self.error_chain {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&chain);
        }
        content
    }
}

impl Visit for ContentVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        // -- first error gets the full chain, any extras ride along as plain fields
        if self.error_chain.is_none() {
            self.error_chain = Some(render_content("", Some(value)));
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
