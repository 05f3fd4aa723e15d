pub mod document;
pub mod health;

#[cfg(test)]
pub(crate) mod test_support;
