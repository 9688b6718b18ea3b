/// Application name
pub const APP_NAME: &str = "Agora";

/// Remote collections mirrored by the client
pub const COLLECTION_MESSAGES: &str = "messages";
pub const COLLECTION_POSTS: &str = "posts";
pub const COLLECTION_VIDEOS: &str = "videos";
pub const COLLECTION_DOUBTS: &str = "doubts";
pub const COLLECTION_DOUBT_ANSWERS: &str = "doubt_answers";
pub const COLLECTION_STUDY_MATERIALS: &str = "study_materials";

/// Object storage buckets
pub const BUCKET_POSTS: &str = "posts";
pub const BUCKET_VIDEOS: &str = "videos";
pub const BUCKET_STUDY_MATERIALS: &str = "study-materials";

/// Row cap for the chat window (most recent messages)
pub const CHAT_WINDOW: u32 = 100;

/// Maximum upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Default bound on a single remote call, in seconds
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 15;

/// Path prefix of public object URLs
pub const PUBLIC_OBJECT_PATH: &str = "storage/v1/object/public";

/// Subject tags offered by the student hub
pub const SUBJECTS: [&str; 10] = [
    "Mathematics",
    "Physics",
    "Chemistry",
    "Biology",
    "English",
    "Hindi",
    "History",
    "Geography",
    "Computer Science",
    "Other",
];
