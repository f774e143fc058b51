/// Vault CLI 项目信息模块
///
/// vault-cli 是面向用户的主程序，项目元数据统一在这里定义，
/// vault-core 作为内部库只提供技术性常量。

/// 项目元数据（从 Cargo.toml 同步）
pub mod metadata {
    /// 项目名称
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    /// 项目描述
    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    /// 项目作者
    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称（手动维护）
    pub mod display {
        /// 用户友好的项目名称
        pub const FRIENDLY_NAME: &str = "Vault";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "多租户数据库的快照与恢复工具，支持按租户、子租户或集合创建备份，\
             校验备份完整性，按保留期自动清理，以及集合级别的导出与导入";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// 获取版本信息字符串
pub fn get_version_string() -> String {
    format!(
        "{} v{}",
        metadata::display::FRIENDLY_NAME,
        version_info::CLI_VERSION
    )
}
