pub mod cut_tag;
