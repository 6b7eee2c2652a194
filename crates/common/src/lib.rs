// spc-common: wire types shared by the console client and its front ends

pub mod protocol;
