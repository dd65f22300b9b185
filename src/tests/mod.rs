mod helper;
mod items;
