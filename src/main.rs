use ferret::cli::{Cli, Commands, ConfigAction};
use ferret::config::{expand_path, Config};
use ferret::correlation::{extract_indicators, CorrelationRequest, Depth, EntityKind};
use ferret::embedding::provider_from_config;
use ferret::engine::{build_registry, Query, SearchEngine};
use ferret::error::{FerretError, Result};
use ferret::router::{Strategy, StrategyRouter};
use ferret::sources::{Record, SourceKind};
use ferret::storage::RecordStore;
use ferret::tools::{ToolDescriptor, ToolRelevanceScorer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let config_path = cli.config;
    let profile = cli.profile;

    match cli.command {
        Commands::Classify { query, json } => cmd_classify(&query, json)?,
        Commands::Search {
            query,
            org,
            sources,
            limit,
            threshold,
            strategy,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            let mut q = Query::new(query, org)
                .with_max_results(limit.unwrap_or(config.search.default_max_results))
                .with_similarity_threshold(
                    threshold.unwrap_or(config.search.default_similarity_threshold),
                )
                .with_sources(parse_sources(&sources)?);
            if let Some(strategy) = strategy {
                q = q.with_strategy(strategy.parse::<Strategy>()?);
            }
            cmd_search(&config, &q, json)?;
        }
        Commands::Correlate {
            value,
            org,
            kind,
            depth,
            threshold,
            no_timeline,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            let kind = match kind {
                Some(k) => k.parse::<EntityKind>()?,
                None => EntityKind::detect(&value).ok_or_else(|| {
                    FerretError::Config(format!(
                        "Cannot infer the entity kind of '{}'; pass --kind",
                        value
                    ))
                })?,
            };
            let request = CorrelationRequest::new(kind, value, org)
                .with_depth(depth.parse::<Depth>()?)
                .with_timeline(!no_timeline)
                .with_threshold(threshold.unwrap_or(config.correlation.default_confidence_threshold));
            cmd_correlate(&config, &request, json)?;
        }
        Commands::Tools {
            query,
            tools,
            recommended,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            cmd_tools(&config, &query, &tools, recommended, json)?;
        }
        Commands::Indicators { text, json } => cmd_indicators(text, json)?,
        Commands::Import { file, no_embed } => {
            let config = load_config(config_path, profile)?;
            cmd_import(&config, &file, no_embed)?;
        }
        Commands::Stats { json } => {
            let config = load_config(config_path, profile)?;
            cmd_stats(&config, json)?;
        }
        Commands::Config { action } => cmd_config(config_path, profile, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "ferret=debug" } else { "ferret=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| FerretError::Io {
            source: e,
            context: "Failed to create tokio runtime".to_string(),
        })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| FerretError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn parse_sources(sources: &[String]) -> Result<Vec<SourceKind>> {
    sources.iter().map(|s| s.parse::<SourceKind>()).collect()
}

fn open_store(config: &Config) -> Result<Arc<RecordStore>> {
    let path = expand_path(&config.storage.database_path);
    Ok(Arc::new(RecordStore::open(&path)?))
}

fn build_engine(config: &Config) -> Result<SearchEngine> {
    let store = open_store(config)?;
    let embedder = provider_from_config(&config.embedding)?;
    // each invocation is its own process, so the result cache is never attached here
    SearchEngine::new(build_registry(store, embedder), config)
}

fn cmd_classify(query: &str, json: bool) -> Result<()> {
    let classification = ferret::classify(query);
    let plan = StrategyRouter::default().route(&classification, None, &[]);

    if json {
        #[derive(Serialize)]
        struct Output<'a> {
            classification: &'a ferret::Classification,
            plan: &'a ferret::router::ExecutionPlan,
        }
        return print_json(&Output {
            classification: &classification,
            plan: &plan,
        });
    }

    println!("Query type:  {}", classification.query_type);
    println!("Confidence:  {:.2}", classification.confidence);
    println!("Strategy:    {}", classification.suggested_strategy);
    let tags: Vec<&str> = classification
        .detected_entities
        .iter()
        .map(|t| t.as_str())
        .collect();
    println!("Entities:    {}", if tags.is_empty() { "-".to_string() } else { tags.join(", ") });
    println!("Identifier:  {}", classification.has_exact_identifier);
    println!("Plan:        {} steps, {:?}", plan.steps.len(), plan.consolidation);
    Ok(())
}

fn cmd_search(config: &Config, query: &Query, json: bool) -> Result<()> {
    let engine = build_engine(config)?;
    let response = runtime()?.block_on(engine.hybrid_search(query))?;

    if json {
        return print_json(&response);
    }

    let results = &response.results;
    println!(
        "{} result(s) via {} ({} ms){}",
        results.len(),
        results.strategy,
        results.metadata.search_time_ms,
        if response.success { "" } else { " [all sources failed]" }
    );
    for (i, r) in results.results.iter().enumerate() {
        println!(
            "{:>3}. [{:.2}] {} {} - {}",
            i + 1,
            r.normalized_score,
            r.source_kind,
            r.source_id,
            r.record.display_name()
        );
    }
    for error in &response.errors {
        println!("  ! {}", error);
    }
    Ok(())
}

fn cmd_correlate(config: &Config, request: &CorrelationRequest, json: bool) -> Result<()> {
    let engine = build_engine(config)?;
    let report = runtime()?.block_on(engine.find_related(request))?;

    if json {
        return print_json(&report);
    }

    println!(
        "{} hit(s) for {} '{}' at {} depth ({} ms)",
        report.hits.len(),
        report.entity_kind,
        report.entity_value,
        report.depth,
        report.search_time_ms
    );
    for warning in &report.warnings {
        println!("  ⚠ {}", warning);
    }
    for hit in &report.hits {
        println!(
            "  [{:.1}] {} {} - {}",
            hit.confidence,
            hit.source_kind,
            hit.source_id,
            hit.record.display_name()
        );
    }
    if !report.timeline.is_empty() {
        println!("\nTimeline:");
        for hit in &report.timeline {
            let when = hit
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  {}  {} {}", when, hit.source_kind, hit.source_id);
        }
    }
    let buckets = &report.pattern_summary.confidence_buckets;
    println!(
        "\nConfidence: {} high, {} medium, {} low",
        buckets.high, buckets.medium, buckets.low
    );
    if let Some(span) = &report.pattern_summary.timespan {
        println!("Timespan:   {:.1} days", span.span_days);
    }
    for (source, errors) in &report.per_source_errors {
        for e in errors {
            println!("  ! {}: {}", source, e);
        }
    }
    Ok(())
}

fn cmd_tools(config: &Config, query: &str, tools: &[String], recommended: bool, json: bool) -> Result<()> {
    let classification = ferret::classify(query);
    let descriptors: Vec<ToolDescriptor> = tools.iter().map(ToolDescriptor::new).collect();
    let scorer = ToolRelevanceScorer::new(config.tools.recommend_threshold);
    let scores = if recommended {
        scorer.recommend(&classification, &descriptors)
    } else {
        scorer.score(&classification, &descriptors)
    };

    if json {
        return print_json(&scores);
    }

    for s in &scores {
        println!(
            "{} {:.1} {}",
            if s.recommended { "✓" } else { " " },
            s.score,
            s.tool_name
        );
        for reason in &s.reasons {
            println!("      - {}", reason);
        }
    }
    Ok(())
}

fn cmd_indicators(text: Option<String>, json: bool) -> Result<()> {
    let text = match text {
        Some(t) => t,
        None => std::io::read_to_string(std::io::stdin()).map_err(|e| FerretError::Io {
            source: e,
            context: "Failed to read stdin".to_string(),
        })?,
    };
    let indicators = extract_indicators(&text);

    if json {
        return print_json(&indicators);
    }

    for indicator in &indicators {
        match &indicator.algorithm {
            Some(algo) => println!("{:<12} {} ({})", indicator.kind, indicator.value, algo),
            None => println!("{:<12} {}", indicator.kind, indicator.value),
        }
    }
    Ok(())
}

fn cmd_import(config: &Config, file: &Path, no_embed: bool) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| FerretError::Io {
        source: e,
        context: format!("Failed to read {:?}", file),
    })?;
    let records: Vec<Record> = serde_json::from_str(&content).map_err(|e| FerretError::Json {
        source: e,
        context: format!("Failed to parse records from {:?}", file),
    })?;

    let store = open_store(config)?;
    let embedder = if no_embed {
        None
    } else {
        Some(provider_from_config(&config.embedding)?)
    };
    let summary = store.import(&records, embedder.as_deref())?;

    println!("✓ Imported {} record(s)", summary.records);
    println!("  Embedded: {}", summary.embedded);
    if summary.embedding_failures > 0 {
        println!("  Embedding failures: {}", summary.embedding_failures);
    }
    Ok(())
}

fn cmd_stats(config: &Config, json: bool) -> Result<()> {
    let stats = open_store(config)?.stats()?;

    if json {
        return print_json(&stats);
    }

    println!("Ferret record store");
    println!("===================");
    for (kind, count) in &stats.records_per_kind {
        println!("  {:<10} {}", kind, count);
    }
    println!("\nTotal records: {}", stats.total_records);
    println!("Embeddings:    {}", stats.embeddings);
    println!("Organizations: {}", stats.organizations);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<String>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| FerretError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let part = value.get(&section).ok_or_else(|| {
                        FerretError::Config(format!("Unknown config section '{}'", section))
                    })?;
                    print_json(part)?;
                }
                None => print_json(&value)?,
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(p) => p,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(p) => p,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(p) => p,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'ferret config init' to create one.");
        if profile.is_some() {
            return Err(FerretError::ConfigNotFound { path });
        }
        return Config::load_or_default(&path);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
