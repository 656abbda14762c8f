//! 定时批处理任务
//!
//! 每次调用执行一次完整流程：
//! - 从 Secrets Manager 获取数据库凭据
//! - 连接数据库并执行巡检查询
//! - 将结果记录以 JSON 写入 S3
//!
//! 在 Lambda 环境中按事件调用；否则在本地执行一次后退出。

mod database;
mod probe;
mod runner;
mod secrets;
mod state;
mod storage;

use common::config::{AppConfig, LogFormat};
use common::models::ResultRecord;
use common::utils::IdGenerator;
use lambda_runtime::{service_fn, LambdaEvent};
use state::AppState;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "batch-job";

/// Set by the Lambda execution environment.
const LAMBDA_RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    // 加载配置
    let (config, config_warnings) = AppConfig::load();

    // 初始化日志追踪
    init_tracing(config.log_format);
    for warning in &config_warnings {
        warning.log();
    }

    info!(
        service = SERVICE_NAME,
        bucket = config.output_bucket.as_deref().unwrap_or("<unset>"),
        payload_policy = ?config.payload_policy,
        probe_enabled = config.probe_enabled,
        "启动批处理任务"
    );

    let state = AppState::new(config).await;

    if std::env::var(LAMBDA_RUNTIME_API_ENV).is_ok() {
        lambda_runtime::run(service_fn(|event: LambdaEvent<serde_json::Value>| {
            handle_event(&state, event)
        }))
        .await
    } else {
        run_once(&state).await
    }
}

/// Lambda handler. The event payload is not used.
async fn handle_event(
    state: &AppState,
    event: LambdaEvent<serde_json::Value>,
) -> Result<ResultRecord, lambda_runtime::Error> {
    let span = info_span!(
        "batch_run",
        run_id = %IdGenerator::run_id(),
        request_id = %event.context.request_id,
    );
    let record = state.runner().run().instrument(span).await?;
    Ok(record)
}

/// Local one-shot run; prints the record and fails the process on error.
async fn run_once(state: &AppState) -> Result<(), lambda_runtime::Error> {
    let span = info_span!("batch_run", run_id = %IdGenerator::run_id());
    let record = state.runner().run().instrument(span).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_ansi(false),
            )
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
