use anyhow::Context;
use clap::Parser;
use rwe_planner::utils::error::ErrorSeverity;
use rwe_planner::utils::{logger, validation::Validate};
use rwe_planner::{CliConfig, Command, PlannerConfig, PlannerError, StudyPlanner, StudyRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌：伺服器模式輸出 JSON
    match cli.command {
        Command::Serve { .. } => logger::init_server_logger(),
        _ => logger::init_cli_logger(cli.verbose),
    }

    tracing::info!("Starting rwe-planner");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = cli.validate() {
        tracing::error!("❌ Argument validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    let planner = match StudyPlanner::from_config(config) {
        Ok(planner) => Arc::new(planner),
        Err(e) => exit_with(&e),
    };

    match cli.command {
        Command::Serve { .. } => {
            let bind_address = planner.config().server.bind_address.clone();
            if let Err(e) = rwe_planner::app::run(planner, &bind_address).await {
                exit_with(&e);
            }
        }
        Command::Plan { request, summary } => {
            let body = std::fs::read_to_string(&request)
                .with_context(|| format!("failed to read {}", request.display()))?;
            let value = serde_json::from_str(&body)
                .map_err(|e| PlannerError::validation("body", e.to_string()));
            let study = match value.and_then(StudyRequest::from_json) {
                Ok(study) => study,
                Err(e) => exit_with(&e),
            };

            let run = planner.run(study, cancel_on_ctrl_c()).await;
            if summary {
                if let Some(context) = &run.context {
                    let rendered = serde_json::to_string_pretty(&context.execution_summary())?;
                    eprintln!("{}", rendered);
                }
            }

            match run.result {
                Ok(plan) => {
                    for degradation in &plan.degradations {
                        eprintln!(
                            "⚠️ {} ({}): {}",
                            degradation.stage, degradation.service, degradation.reason
                        );
                    }
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                }
                Err(e) => exit_with(&e),
            }
        }
        Command::Quick {
            protocol_text,
            protocol_file,
        } => {
            let text = match (protocol_text, protocol_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => exit_with(&PlannerError::MissingConfigError {
                    field: "protocol_text".to_string(),
                }),
            };

            match planner.quick_assessment(&text).await {
                Ok(assessment) => println!("{}", serde_json::to_string_pretty(&assessment)?),
                Err(e) => exit_with(&e),
            }
        }
        Command::Status => {
            let report = planner.service_status().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !rwe_planner::core::health::all_healthy(&report) {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

/// 設定檔（可選）加上命令列覆寫
fn load_config(cli: &CliConfig) -> rwe_planner::Result<PlannerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📄 Loading configuration from {}", path.display());
            PlannerConfig::from_file(path)?
        }
        None => PlannerConfig::default(),
    };

    if let Command::Serve {
        bind,
        expose_errors,
    } = &cli.command
    {
        if let Some(bind) = bind {
            config.server.bind_address = bind.clone();
        }
        config.server.expose_error_details |= *expose_errors;
    }

    config.validate()?;
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupted, cancelling outstanding backend calls");
            trigger.cancel();
        }
    });
    cancel
}

fn exit_with(e: &PlannerError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 130,   // 使用者中斷
        ErrorSeverity::Medium => 2,  // 後端不可用，可重試
        ErrorSeverity::High => 1,    // 請求或設定錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    };
    std::process::exit(exit_code)
}
