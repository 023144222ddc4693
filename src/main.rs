//! ttscache - TTS 缓存命令行
//!
//! - synthesize: 经过缓存合成一段文本并写入文件
//! - entries: 加载缓存目录并列出条目

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ttscache::application::ports::{AudioStream, SynthesisRequest, TtsCachePort, TtsEnginePort};
use ttscache::config::{load_config_from_path, print_config, AppConfig};
use ttscache::domain::{AudioFormat, Voice};
use ttscache::infrastructure::adapters::{
    FakeTtsClient, FakeTtsClientConfig, HttpTtsClient, HttpTtsClientConfig,
};
use ttscache::infrastructure::persistence::TtsLruCache;

/// 命令行参数
#[derive(Parser)]
#[command(name = "ttscache")]
#[command(about = "Disk-backed LRU cache for synthesized speech", long_about = None)]
struct Cli {
    /// 配置文件路径，不指定时搜索 config.toml / config.local.toml
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 合成文本并写入音频文件
    Synthesize {
        /// 要合成的文本
        #[arg(long)]
        text: String,
        /// 音色标识
        #[arg(long, default_value = "default")]
        voice: String,
        /// 音频格式: wav, mp3, ogg, opus
        #[arg(long, default_value = "wav")]
        format: String,
        /// 输出文件
        #[arg(long)]
        output: PathBuf,
        /// 使用固定音频文件代替 HTTP TTS 服务
        #[arg(long)]
        fake_audio: Option<PathBuf>,
    },
    /// 列出缓存条目和统计信息
    Entries,
}

fn init_logging(config: &AppConfig) {
    let log_filter = format!("{},ttscache={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_engine(config: &AppConfig, fake_audio: Option<PathBuf>) -> Result<Arc<dyn TtsEnginePort>> {
    match fake_audio {
        Some(path) => {
            let client = FakeTtsClient::new(FakeTtsClientConfig::new(path))
                .context("Failed to load fake audio file")?;
            Ok(Arc::new(client))
        }
        None => {
            let client = HttpTtsClient::new(HttpTtsClientConfig::from(&config.tts))?;
            Ok(Arc::new(client))
        }
    }
}

async fn synthesize(
    cache: &TtsLruCache,
    engine: Arc<dyn TtsEnginePort>,
    text: String,
    voice: String,
    format: String,
    output: PathBuf,
) -> Result<()> {
    let format = AudioFormat::from_extension(&format)
        .with_context(|| format!("Unsupported audio format: {}", format))?;
    let voice = Voice::new(voice.clone(), voice, "und").map_err(|e| anyhow::anyhow!(e))?;
    let request = SynthesisRequest::new(text, voice, format);

    let mut stream = cache.get_or_synthesize(engine, request).await?;
    let mut file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("Cannot create {}", output.display()))?;
    let written = tokio::io::copy(&mut stream, &mut file).await?;
    let format = stream.format().await;
    drop(stream);

    tracing::info!(
        output = %output.display(),
        bytes = written,
        format = %format,
        "Audio written"
    );
    log_stats(cache).await;
    Ok(())
}

async fn list_entries(cache: &TtsLruCache) {
    for entry in cache.entries().await {
        tracing::info!(
            key = %entry.key,
            text = %entry.text,
            size_bytes = entry.size_bytes,
            completed = entry.completed,
            format = ?entry.format.as_ref().map(|f| f.to_string()),
            "Cache entry"
        );
    }
    log_stats(cache).await;
}

async fn log_stats(cache: &TtsLruCache) {
    let stats = cache.stats().await;
    tracing::info!(
        enabled = stats.enabled,
        entries = stats.total_entries,
        size_bytes = stats.total_size_bytes,
        max_size_bytes = stats.max_size_bytes,
        hits = stats.hit_count,
        misses = stats.miss_count,
        "Cache statistics"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_logging(&config);
    print_config(&config);

    let cache = TtsLruCache::activate(&config.cache).await;

    match cli.command {
        Commands::Synthesize {
            text,
            voice,
            format,
            output,
            fake_audio,
        } => {
            let engine = build_engine(&config, fake_audio)?;
            if !engine.health_check().await {
                tracing::warn!(engine = engine.id(), "TTS engine health check failed");
            }
            synthesize(&cache, engine, text, voice, format, output).await?;
        }
        Commands::Entries => list_entries(&cache).await,
    }

    Ok(())
}
