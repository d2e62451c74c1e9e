use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

use annotate::{
    AnnotationEvent, Context, EngineError, InferiorEndpoints, Session, SessionEvent,
    TokioLauncher, Update,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("annotate", log::LevelFilter::Debug)
        .init()
        .unwrap();

    log::info!("a2gdb starting...");

    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{}", e);
            1
        }
    };

    log::info!("Application exited with code: {exit_code}");
    std::process::exit(exit_code);
}

fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("A2GDB_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".a2gdb"),
        None => std::env::temp_dir().join("a2gdb"),
    }
}

async fn run() -> annotate::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut context = Context::create(None, &args, &config_dir())?;
    let started = context.initialize(&mut TokioLauncher)?;

    let mut debugger = started.debugger;
    let missing = |what: &str| EngineError::SpawnFailure(format!("debugger has no {}", what));
    let stdin = debugger.take_stdin().ok_or_else(|| missing("stdin"))?;
    let stdout = debugger.take_stdout().ok_or_else(|| missing("stdout"))?;
    let stderr = debugger.take_stderr().ok_or_else(|| missing("stderr"))?;

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log::warn!("Debugger stderr: {}", line);
        }
    });

    let InferiorEndpoints {
        stdin: mut inferior_stdin,
        stdout: mut inferior_stdout,
        path,
    } = started.inferior;
    log::info!("Inferior terminal: {}", path.display());

    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        while let Ok(n) = inferior_stdout.read(&mut buf) {
            if n == 0 {
                break;
            }
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(&buf[..n]);
            let _ = out.flush();
        }
    });

    // Lines starting with '!' are typed into the inferior's terminal.
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(text) = line.strip_prefix('!') {
                let _ = writeln!(inferior_stdin, "{}", text);
                let _ = inferior_stdin.flush();
            } else if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut prompt = String::from("(gdb) ");
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::DebuggerOutput(bytes) | SessionEvent::InferiorOutput(bytes) => {
                    let mut out = std::io::stdout().lock();
                    let _ = out.write_all(&bytes);
                    let _ = out.flush();
                }
                SessionEvent::Update(Update::PromptChanged(text)) => prompt = text,
                SessionEvent::Ready => {
                    print!("{}", prompt);
                    let _ = std::io::stdout().flush();
                }
                SessionEvent::Update(Update::Annotation(AnnotationEvent::InfoSource(location))) => {
                    log::info!("At {}:{}", location.file, location.line);
                }
                SessionEvent::Update(update) => log::info!("{:?}", update),
                SessionEvent::Exited => break,
            }
        }
    });

    let session = Session::new(context, stdin, event_tx).run(stdout, line_rx);
    tokio::pin!(session);
    let mut context = loop {
        tokio::select! {
            result = &mut session => break result?,
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = debugger.interrupt() {
                    log::warn!("Failed to interrupt debugger: {}", e);
                }
            }
        }
    };
    let _ = printer.await;

    context.shutdown()?;
    let status = debugger.wait().await?;
    log::info!("Debugger exited: {}", status);
    Ok(())
}
