// Service exports
pub mod appwrite;
pub mod cache;
pub mod matching;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use appwrite::{AppwriteClient, AppwriteCollections, AppwriteError, AppwriteStorage};
pub use cache::{CacheError, CacheKey, KeyValueStore, MemoryStore, RedisStore, ResultCache};
pub use matching::{Collaborators, MatchingError, MatchingLimits, MatchingService};
pub use memory::{InMemoryPreferences, InMemoryProperties, RecordingNotifier, StaticMediaResolver};
pub use postgres::{PostgresClient, PostgresError};
pub use traits::{MediaResolver, Notifier, PreferenceSource, PropertySource, SourceError};
