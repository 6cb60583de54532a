/*!
 * Object-store transports used by the file storages
 */

pub mod s3;
