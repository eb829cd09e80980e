//! 测试用内存实现：存储与网络
//!
//! 集成测试通过 `MockNetworkHub` 在单进程内组网，并可按链路切断网络
//! 以模拟分区；`MemoryStorage` 满足持久化接口但不落盘。

mod memory_storage;
mod mock_network;

pub use memory_storage::MemoryStorage;
pub use mock_network::{MockNetworkHub, MockNodeNetwork, NetworkEvent};
