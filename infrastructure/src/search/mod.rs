pub mod attribute_index;
