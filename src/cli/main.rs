use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use failure_predictor::{
    config::ModelConfig,
    ml::{load_classifier, PredictionReport, PredictionService, DEFAULT_NO_FAILURE_LABEL, DEFAULT_RISK_THRESHOLD},
    models::{ProductType, RawFields, RawValue, SensorReading},
};
use reqwest::Client;
use std::path::PathBuf;
use validator::Validate;

const BAR_WIDTH: usize = 40;

#[derive(Parser)]
#[command(name = "fp-cli")]
#[command(about = "Machine failure predictor CLI", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "FP_ENDPOINT")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ReadingArgs {
    /// Air temperature [K]
    #[arg(long, default_value_t = 300.0)]
    air_temp: f64,

    /// Process temperature [K]
    #[arg(long, default_value_t = 310.0)]
    process_temp: f64,

    /// Rotational speed [rpm]
    #[arg(long, default_value_t = 1500.0)]
    speed: f64,

    /// Torque [Nm]
    #[arg(long, default_value_t = 40.0)]
    torque: f64,

    /// Tool wear [min]
    #[arg(long, default_value_t = 50.0)]
    tool_wear: f64,

    /// Product type (L, M or H)
    #[arg(short = 't', long, default_value = "M")]
    product_type: ProductType,

    /// Raw field as NAME=VALUE; when given, the typed readings are ignored
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    fields: Vec<(String, RawValue)>,
}

impl ReadingArgs {
    fn reading(&self) -> SensorReading {
        SensorReading {
            air_temperature_k: self.air_temp,
            process_temperature_k: self.process_temp,
            rotational_speed_rpm: self.speed,
            torque_nm: self.torque,
            tool_wear_min: self.tool_wear,
            product_type: self.product_type,
        }
    }

    fn raw_fields(&self) -> Option<RawFields> {
        if self.fields.is_empty() {
            None
        } else {
            Some(self.fields.iter().cloned().collect())
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Submit readings to a running server
    Predict {
        #[command(flatten)]
        reading: ReadingArgs,
    },

    /// Load a model file and predict in-process
    Local {
        /// Model artifact
        #[arg(short, long, default_value = "models/model.json")]
        model: PathBuf,

        /// Label of the no-failure class
        #[arg(long, default_value = DEFAULT_NO_FAILURE_LABEL)]
        no_failure_label: String,

        /// Aggregate risk above which a warning is shown
        #[arg(long, default_value_t = DEFAULT_RISK_THRESHOLD)]
        threshold: f64,

        #[command(flatten)]
        reading: ReadingArgs,
    },

    /// Print the metadata of a model file
    Inspect {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
    },

    /// Check server health
    Health,
}

fn parse_field(s: &str) -> Result<(String, RawValue), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;

    let trimmed = value.trim();
    let value = if trimmed.eq_ignore_ascii_case("true") {
        RawValue::Bool(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        RawValue::Bool(false)
    } else {
        match trimmed.parse::<f64>() {
            Ok(n) => RawValue::Number(n),
            Err(_) => RawValue::Text(value.to_string()),
        }
    };
    Ok((name.to_string(), value))
}

fn print_report(report: &PredictionReport) {
    println!("Predicted failure type: {}", report.label);

    if let Some(probabilities) = &report.probabilities {
        println!();
        println!("Class probabilities:");
        let width = probabilities.iter().map(|p| p.label.len()).max().unwrap_or(0);
        for p in probabilities {
            let filled = (p.probability * BAR_WIDTH as f64).round() as usize;
            println!(
                "  {:<width$}  {:>6.2}%  {}",
                p.label,
                p.probability * 100.0,
                "#".repeat(filled.min(BAR_WIDTH)),
                width = width
            );
        }
    } else {
        println!("(model provides no probability estimates)");
    }

    if let Some(risk) = &report.risk {
        println!();
        println!(
            "Aggregate failure risk: {:.1}% (threshold {:.1}%)",
            risk.aggregate_risk * 100.0,
            risk.threshold * 100.0
        );
        if risk.warning {
            println!(
                "WARNING: failure risk {:.1}% exceeds {:.1}%. Schedule maintenance.",
                risk.aggregate_risk * 100.0,
                risk.threshold * 100.0
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "failure_predictor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Predict { reading } => {
            let request = match reading.raw_fields() {
                Some(fields) => client
                    .post(format!("{}/v1/predict/raw", cli.endpoint))
                    .json(&serde_json::json!({ "fields": fields })),
                None => client
                    .post(format!("{}/v1/predict", cli.endpoint))
                    .json(&reading.reading()),
            };

            let response = request.send().await.context("request failed")?;
            let status = response.status();
            let body: serde_json::Value = response.json().await?;

            if !status.is_success() {
                bail!("server returned {}: {}", status, serde_json::to_string_pretty(&body)?);
            }

            let report: PredictionReport = serde_json::from_value(body)?;
            print_report(&report);
        }

        Commands::Local {
            model,
            no_failure_label,
            threshold,
            reading,
        } => {
            let config = ModelConfig {
                path: model,
                no_failure_label,
                risk_threshold: threshold,
                feature_schema: None,
            };
            let service = PredictionService::from_config(&config)
                .with_context(|| format!("loading {}", config.path.display()))?;

            let report = match reading.raw_fields() {
                Some(fields) => service.predict_fields(&fields)?,
                None => {
                    let reading = reading.reading();
                    reading.validate()?;
                    service.predict_reading(&reading)?
                }
            };
            print_report(&report);
        }

        Commands::Inspect { model } => {
            let classifier = load_classifier(&model)
                .with_context(|| format!("loading {}", model.display()))?;
            let metadata = classifier.metadata();

            println!("Name:          {}", metadata.name);
            println!("Version:       {}", metadata.version.as_deref().unwrap_or("-"));
            println!("Type:          {}", metadata.model_type);
            println!("Features:      {}", metadata.n_features);
            println!("Classes:       {}", metadata.n_classes);
            println!("Probabilities: {}", if classifier.supports_proba() { "yes" } else { "no" });
            println!("Digest:        {}", metadata.digest.as_deref().unwrap_or("-"));

            match classifier.classes() {
                Some(classes) => println!("Class labels:  {}", classes.join(", ")),
                None => println!("Class labels:  (not recorded)"),
            }
            match classifier.feature_names_in() {
                Some(names) => println!("Feature names: {}", names.join(", ")),
                None => println!("Feature names: (not recorded)"),
            }
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
