pub mod mock_server;

pub use mock_server::MockSessionServer;
