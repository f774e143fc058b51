use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use vault_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use vault_core::{VaultError, constants::config::CONFIG_FILE_NAME};

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        let path = cli
            .config
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        return run_init(&path, force).await.context("初始化失败");
    }

    let mut app = match CliApp::new_with_config_path(cli.config.as_deref()).await {
        Ok(app) => app,
        Err(e @ VaultError::NotFound(_)) if cli.config.is_none() => {
            error!("👉 请先运行 'vault-cli init' 命令来创建配置文件。");
            return Err(e).context("配置文件未找到");
        }
        Err(e) => return Err(e).context("应用初始化失败"),
    };

    app.run_command(cli.command).await.context("操作失败")
}
