//! The concrete import steps.
//!
//! An import is always the same short plan: upload the image, register it as
//! a template, then remove the temporary object.

mod delete;
mod register;
mod upload;

pub use delete::DeleteStep;
pub use register::RegisterStep;
pub use upload::UploadStep;

use crate::step::Step;

/// Steps executed for one import, in order.
///
/// With `skip_clean` the temporary object is left in storage once the
/// template is registered.
#[must_use]
pub fn plan(skip_clean: bool) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![Box::new(UploadStep), Box::new(RegisterStep)];
    if !skip_clean {
        steps.push(Box::new(DeleteStep));
    }
    steps
}
