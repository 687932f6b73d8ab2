pub mod object_urls;
pub mod uploader;
