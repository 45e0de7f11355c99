use std::sync::Arc;

use tracing::{error, info, warn};

use pdf_signer::config::load_config;
use pdf_signer::document::read_inputs;
use pdf_signer::error::format_error_chain;
use pdf_signer::raster::PdfiumBackend;
use pdf_signer::session::{SigningSession, UploadOutcome};
use pdf_signer::signature::load_default_signature;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting PDF signer v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        inputs = config.batch.inputs.len(),
        output = %config.output.directory.display(),
        "Configuration loaded"
    );

    let backend = Arc::new(PdfiumBackend::new(config.render.library_path.clone()));
    let session = SigningSession::new(config.clone(), backend);

    // A custom upload wins over the bundled default
    match &config.signature.custom_path {
        Some(path) => {
            session.load_custom_signature(path);
        }
        None => session.set_signature(load_default_signature(
            config.signature.default_path.as_deref(),
        )),
    }

    // Gestures address documents by input position, so unreadable files stay
    let documents = read_inputs(&config.batch.inputs);
    if let UploadOutcome::Superseded { batch } = session.upload(documents).await {
        warn!(batch = batch, "Upload batch was superseded");
        return Ok(());
    }

    for scripted in &config.batch.gestures {
        if let Err(e) = session.apply_gesture(scripted.document, scripted.page, scripted.gesture) {
            warn!(
                document = scripted.document,
                page = scripted.page,
                error_code = e.error_code(),
                error = %e,
                "Skipping gesture"
            );
        }
    }

    let directory = &config.output.directory;
    let mut written = 0usize;
    let mut failed = 0usize;

    for output in session.export_all().await? {
        // Export failures are logged by the session
        let Ok(pdf) = output else {
            failed += 1;
            continue;
        };
        match pdf.write_to(directory) {
            Ok(_) => written += 1,
            Err(e) => {
                error!(file = %pdf.file_name, error = %e, "Failed to write output");
                failed += 1;
            }
        }
    }

    if config.batch.export_pages {
        let batch = session.current_batch();
        for (index, entry) in batch.documents.iter().enumerate() {
            let Some(page_count) = entry.page_count() else {
                continue;
            };
            for number in 1..=page_count {
                let result = session
                    .export_page(index, number)
                    .await
                    .and_then(|pdf| Ok(pdf.write_to(directory)?));
                match result {
                    Ok(_) => written += 1,
                    Err(e) => {
                        error!(
                            document = %entry.document.display_name,
                            page = number,
                            error = %format_error_chain(&e),
                            "Page export failed"
                        );
                        failed += 1;
                    }
                }
            }
        }
    }

    info!(written = written, failed = failed, "Signing finished");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdf_signer=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
