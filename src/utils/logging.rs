// 日志工具模块
//
// 封装 flexi_logger 的初始化和关闭操作，确保异步日志正确 flush

use crate::config::LogConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use std::sync::Mutex;

/// 全局日志句柄，用于程序退出时 flush
static LOGGER_HANDLE: Mutex<Option<LoggerHandle>> = Mutex::new(None);

/// 初始化日志系统
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Logger::try_with_str(&config.level)?;

    if config.to_file {
        builder = builder
            .log_to_file(
                FileSpec::default()
                    .directory(&config.dir)
                    .basename(&config.file_basename),
            )
            .rotate(
                Criterion::Size(config.max_file_size),
                Naming::Numbers,
                Cleanup::KeepLogFiles(config.max_files),
            )
            .write_mode(WriteMode::Async);
    }

    let handle = builder.start()?;

    let mut guard = LOGGER_HANDLE
        .lock()
        .map_err(|_| "logger handle lock poisoned")?;
    *guard = Some(handle);
    Ok(())
}

/// 关闭日志系统并 flush 缓冲
pub fn shutdown() {
    if let Ok(mut guard) = LOGGER_HANDLE.lock() {
        if let Some(handle) = guard.take() {
            handle.flush();
        }
    }
}
