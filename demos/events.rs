//! Events - observe the full callback sequence of a child process.
//!
//! This example demonstrates:
//! - The started callback, with the child's PID
//! - Separate stdout and stderr handlers, with end of stream
//! - The exit handler, with the raw exit code
//! - A spawn failure, reported as start followed by exit
//!
//! ```sh
//! cargo run --example events
//! ```

use procwire_process::{Process, SpawnRequest};

fn watch(process: &Process, name: &'static str) {
    process.stdout().handler(move |chunk| {
        print!("[{name}] stdout: {}", String::from_utf8_lossy(&chunk));
    });
    process.stderr().handler(move |chunk| {
        print!("[{name}] stderr: {}", String::from_utf8_lossy(&chunk));
    });
    process
        .stdout()
        .end_handler(move || println!("[{name}] stdout closed"));
    process.exit_handler(move |code| println!("[{name}] exit {code}"));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let script = "echo hello; echo oops 1>&2; exit 2";
    let ok = Process::create(
        SpawnRequest::new("sh")
            .args(["-c", script])
            .inherit_env(),
    );
    watch(&ok, "sh");
    ok.start_with(|p| println!("[sh] started, pid {:?}", p.pid()))?;
    ok.wait().await?;

    let missing = Process::create(SpawnRequest::new("/no/such/program"));
    watch(&missing, "missing");
    missing.start_with(|p| println!("[missing] started, pid {:?}", p.pid()))?;
    missing.wait().await?;

    Ok(())
}
