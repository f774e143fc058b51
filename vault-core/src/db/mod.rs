// 备份登记库的 DuckDB 存储层
//
// DuckDB 连接只在一个阻塞线程里使用：DuckDbActor 持有连接并串行处理消息，
// DuckDbManager 是可克隆的异步句柄，通过 mpsc 发送请求、oneshot 接收结果。
// 记录在这一层以 BackupRow 的行格式存取，时间戳为 unix 毫秒。

mod actor;
mod manager;
mod messages;
mod models;

pub use manager::DuckDbManager;
pub use models::BackupRow;
