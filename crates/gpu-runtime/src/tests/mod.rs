mod completion;
mod protocol_parser;
