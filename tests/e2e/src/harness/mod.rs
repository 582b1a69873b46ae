pub mod service_harness;
pub mod test_repo;

pub use service_harness::ServiceHarness;
pub use test_repo::TestRepo;
