//! Cat - stream text through a child `cat` with backpressure.
//!
//! This example demonstrates:
//! - Building a process with a small stdin high-water mark
//! - Writing with `send()`, which waits for the drain handler when full
//! - Reading stdout chunks through a handler
//!
//! ```sh
//! cargo run --example cat
//! ```

use procwire_process::{Process, SpawnRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let process = Process::builder(SpawnRequest::new("cat").inherit_env())
        .write_queue_max_size(16)
        .build();

    process
        .stdout()
        .handler(|chunk| print!("{}", String::from_utf8_lossy(&chunk)));
    process.start()?;

    let stdin = process.stdin();
    for i in 0..10 {
        stdin.send(format!("line {i}\n")).await?;
    }
    stdin.close()?;

    let code = process.wait().await?;
    println!("cat exited with {code}");
    Ok(())
}
