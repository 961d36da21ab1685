pub mod delete_node;
pub mod exec_on_node;
pub mod list_nodes;
pub mod ping_node;

#[cfg(test)]
pub(crate) mod test_support;
