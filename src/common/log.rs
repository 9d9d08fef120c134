use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;
use tracing_tree::time::UtcDateTime;

const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn tree_layer() -> HierarchicalLayer<fn() -> std::io::Stderr, UtcDateTime> {
    HierarchicalLayer::default()
        .with_indent_amount(2)
        .with_indent_lines(true)
        .with_targets(true)
        .with_deferred_spans(true)
        .with_span_retrace(true)
        .with_timer(UtcDateTime::default())
}

pub fn init_logging() {
    // Another subscriber may already be installed (tests, embedding).
    let _ = Registry::default().with(env_filter()).with(tree_layer()).try_init();
}
