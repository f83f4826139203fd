pub mod db;
pub mod entities;
pub mod ingest_runs;
pub mod lineups;
pub mod records;
pub mod seasons;

pub use db::Db;
pub use entities::EntityCache;
