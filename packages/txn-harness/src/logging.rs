//! Test logging bootstrap shared by every test binary in the workspace.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Crates whose `test_txn=`, `bootstrap=` and `migrate=` markers are worth
/// raising together.
const HARNESS_TARGETS: &[&str] = &["txn_harness", "db_infra", "migration", "agenda"];

/// Everything else stays at `warn`; sqlx statement logging is noise here.
const QUIET: &str = "warn,sqlx=error";

/// Build the filter directives from `TEST_LOG` / `RUST_LOG`.
///
/// A bare level such as `debug` raises only the harness crates. Anything
/// else (`sea_orm=trace`, `info,sqlx=warn`) is used as written.
fn directives(lookup: impl Fn(&str) -> Option<String>) -> String {
    let raw = lookup("TEST_LOG")
        .or_else(|| lookup("RUST_LOG"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match raw {
        None => QUIET.to_string(),
        Some(level) if is_bare_level(&level) => {
            let mut out = String::from(QUIET);
            for target in HARNESS_TARGETS {
                out.push_str(&format!(",{target}={level}"));
            }
            out
        }
        Some(custom) => custom,
    }
}

fn is_bare_level(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Install a test-friendly subscriber once per process.
///
/// Output goes through the test writer so cargo captures it per test.
/// Calling this more than once, or after another subscriber was installed,
/// is a no-op.
///
/// ```bash
/// TEST_LOG=debug cargo test -p agenda
/// ```
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let wanted = directives(|key| std::env::var(key).ok());
        let filter = EnvFilter::try_new(&wanted).unwrap_or_else(|_| EnvFilter::new(QUIET));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_target(true)
            .try_init()
            .ok();
    });
}
