//! 构建信息，队列创建时写入 debug 日志，便于对照线上问题
//!
//! 版本号取自 Cargo.toml，git 信息由 build.rs 通过 vergen 注入。
//! 在没有 git 的环境（例如从 crates.io 源码包构建）中为 `unknown`。

/// crate semver
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 构建时的 git commit
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// 构建时间
pub const BUILD_TIME: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(time) => time,
    None => "unknown",
};

/// 形如 `0.1.0 (abc1234)` 的版本描述
pub fn version_string() -> String {
    let short_sha: String = GIT_SHA.chars().take(7).collect();
    format!("{} ({})", CRATE_VERSION, short_sha)
}
