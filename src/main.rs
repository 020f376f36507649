use layout_grouper::cli::CliArgs;
use layout_grouper::pipeline::{GroupingPipeline, PipelineSummary};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args = match CliArgs::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let options = match args.pipeline_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting layout grouper");
    info!("Matrix source: {:?}", options.source);
    info!("Results directory: {}", options.results_dir.display());
    info!(
        "Similarity threshold: {}, distance threshold: {}",
        options.config.similarity.similarity_threshold, options.config.cluster.distance_threshold
    );

    if let Some(root) = &args.batch {
        match GroupingPipeline::run_batch(root, &options).await {
            Ok(runs) => {
                let failed = runs.iter().filter(|run| run.result.is_err()).count();
                for run in &runs {
                    match &run.result {
                        Ok(summary) => print_summary(&run.name, summary),
                        Err(e) => println!("\n{:=^80}\nFailed: {}", format!(" {} ", run.name), e),
                    }
                }
                info!("Batch completed: {} directories, {} failed", runs.len(), failed);
                if failed > 0 {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                error!("Batch run failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let pipeline = match GroupingPipeline::new(options) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to initialize pipeline: {}", e);
            std::process::exit(1);
        }
    };

    match pipeline.run().await {
        Ok(summary) => {
            info!("Grouping completed successfully!");
            print_summary("GROUPING RESULTS", &summary);
        }
        Err(e) => {
            error!("Grouping failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_summary(title: &str, summary: &PipelineSummary) {
    println!("\n{:=^80}", format!(" {} ", title));
    println!("Pages: {}", summary.page_count());
    println!("Clusters: {}", summary.cluster_count());
    if summary.files_copied > 0 {
        println!("Files copied: {}", summary.files_copied);
    }

    for cluster in &summary.clusters.clusters {
        println!("\n{:-^50}", format!(" CLUSTER {} ", cluster.id));
        for member in &cluster.members {
            println!("- {}", member);
        }
    }
    println!("{:=^80}", "");
}
