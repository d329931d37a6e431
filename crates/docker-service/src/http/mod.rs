pub mod body_builder;
pub mod codec;
pub mod method;
pub mod parameter_encoding;
pub mod request;
pub mod response;
pub mod url_builder;
pub mod wire;

pub use body_builder::{BodyBuilder, BodyEncoding, RequestBody};
pub use codec::{
    Binary, DataStrategy, DateStrategy, JsonDecoderConfig, JsonEncoderConfig, PlistFormat,
    PropertyListEncoderConfig, Timestamp,
};
pub use method::HttpMethod;
pub use parameter_encoding::{
    ArrayEncoding, BoolEncoding, Destination, ParameterEncoding, Parameters, UrlEncoding,
};
pub use request::{BodyPart, DownloadDestination, DownloadLocation, Request, RequestKind};
pub use response::{
    DataDecoder, DownloadedFile, FileDecoder, JsonDecoder, Payload, PropertyListDecoder,
    Response, ResponseDecoder, ResponseResult,
};
pub use url_builder::UrlBuilder;
pub use wire::{ResponseHead, WireRequest};
