use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generates a tiny rocpd-shaped SQLite fixture for manual `traceview-cli` runs.
    GenFixture {
        #[arg(long, default_value = "demos/fixture.rocpd")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Cmd::GenFixture { out } => gen_fixture(&out),
    }
}

const FIXTURE_SQL: &str = r#"
CREATE TABLE rocpd_string (id INTEGER PRIMARY KEY, string TEXT NOT NULL);
CREATE TABLE rocpd_api (
    id INTEGER PRIMARY KEY,
    pid INTEGER NOT NULL,
    tid INTEGER NOT NULL,
    start INTEGER NOT NULL,
    end INTEGER NOT NULL,
    name TEXT NOT NULL,
    category TEXT NOT NULL
);
CREATE TABLE rocpd_op (
    id INTEGER PRIMARY KEY,
    agent_id INTEGER NOT NULL,
    queue_id INTEGER NOT NULL,
    start INTEGER NOT NULL,
    end INTEGER NOT NULL,
    name TEXT NOT NULL,
    category TEXT NOT NULL
);

INSERT INTO rocpd_string (id, string) VALUES (0, 'hipMemcpy'), (1, 'hipLaunchKernel');
INSERT INTO rocpd_api (id, pid, tid, start, end, name, category) VALUES
    (1, 100, 1, 0, 1000, 'hipMemcpy', 'api'),
    (2, 100, 1, 1500, 3000, 'hipLaunchKernel', 'api');
INSERT INTO rocpd_op (id, agent_id, queue_id, start, end, name, category) VALUES
    (1, 0, 0, 1600, 2800, 'vector_add', 'kernel');
"#;

/// Shells out to the system `sqlite3` binary to materialize `FIXTURE_SQL`
/// at `out`, since neither this crate nor its dependency tree links a
/// SQLite driver of its own (xtask stays a pure tooling crate).
fn gen_fixture(out: &PathBuf) -> Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    if out.exists() {
        std::fs::remove_file(out)?;
    }

    let mut child = Command::new("sqlite3")
        .arg(out)
        .stdin(Stdio::piped())
        .spawn()
        .context("failed to launch sqlite3 — install the sqlite3 CLI to use gen-fixture")?;
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(FIXTURE_SQL.as_bytes())?;
    let status = child.wait().context("sqlite3 did not exit cleanly")?;
    if !status.success() {
        anyhow::bail!("sqlite3 exited with {status}");
    }

    println!("wrote fixture trace to {}", out.display());
    Ok(())
}
